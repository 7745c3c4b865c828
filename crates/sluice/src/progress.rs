//! 📊 progress.rs: "did anything actually happen?" answered with counters and a comfy table.
//!
//! 🚀 The reader and writer workers bump atomic counters as they go. At exit the CLI asks for
//! a snapshot and renders it. No progress bar: a poll loop has no finish line to draw toward.
//!
//! 🦆 The duck has counted the events. The duck is satisfied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

/// 🔢 Formats a number with commas. "1000000 events" → "1,000,000 events".
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS once the run has gone long enough to need it.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Shared between workers behind an `Arc`. Every counter only goes up.
#[derive(Debug)]
pub struct RunStats {
    polls: AtomicU64,
    empty_polls: AtomicU64,
    failed_polls: AtomicU64,
    events_read: AtomicU64,
    events_written: AtomicU64,
    write_failures: AtomicU64,
    started: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 📸 A frozen copy of the counters, safe to print, compare, and hand around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub polls: u64,
    pub empty_polls: u64,
    pub failed_polls: u64,
    pub events_read: u64,
    pub events_written: u64,
    pub write_failures: u64,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            empty_polls: AtomicU64::new(0),
            failed_polls: AtomicU64::new(0),
            events_read: AtomicU64::new(0),
            events_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// ✅ A read answered with `events` events.
    pub fn record_poll(&self, events: u64) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.events_read.fetch_add(events, Ordering::Relaxed);
    }

    /// 💤 A read answered "nothing to report this cycle".
    pub fn record_empty_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.failed_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            failed_polls: self.failed_polls.load(Ordering::Relaxed),
            events_read: self.events_read.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl StatsSnapshot {
    /// 🍽️ Two columns, right-aligned, no borders. The NOTHING preset, because borders looked bad.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows = [
            ("polls", format_number(self.polls)),
            ("empty polls", format_number(self.empty_polls)),
            ("failed polls", format_number(self.failed_polls)),
            ("events read", format_number(self.events_read)),
            ("events written", format_number(self.events_written)),
            ("write failures", format_number(self.write_failures)),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label).set_alignment(CellAlignment::Right),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_commas_show_up_for_big_numbers() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_long_runs_earn_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_every_kind_of_poll_counts_as_a_poll() {
        let stats = RunStats::new();
        stats.record_poll(3);
        stats.record_empty_poll();
        stats.record_failed_poll();
        stats.record_written();
        stats.record_write_failure();

        let snapshot = stats.snapshot();

        assert_eq!(snapshot.polls, 3);
        assert_eq!(snapshot.empty_polls, 1);
        assert_eq!(snapshot.failed_polls, 1);
        assert_eq!(snapshot.events_read, 3);
        assert_eq!(snapshot.events_written, 1);
        assert_eq!(snapshot.write_failures, 1);
    }

    #[test]
    fn the_one_where_the_table_mentions_everything() {
        let rendered = StatsSnapshot {
            events_read: 12_345,
            ..StatsSnapshot::default()
        }
        .render();

        assert!(rendered.contains("events read"));
        assert!(rendered.contains("12,345"));
        assert!(rendered.contains("write failures"));
    }
}
