//! ⏰ TimeRangeResolver: "from when, until when?" asked once per tick, answered without gaps.
//!
//! The rules, in the order they get a vote:
//! 1. Never read successfully before? Use `init_earliest_time`. No exceptions, no vibes.
//! 2. Explicit `earliest_time` override? Use it verbatim.
//! 3. Otherwise go incremental: the last successful read time (formatted), or for realtime,
//!    a relative `-{seconds}s` covering only the delta since the previous poll.
//!
//! Realtime earliest values wear an `rt` prefix. The latest bound for realtime is the bare
//! `rt` sentinel, meaning "now, continuously". Two different `rt`s. Same letters. Different jobs.

use anyhow::{Result, bail};
use chrono::{DateTime, Local};

use super::{ExecMode, ReaderConfig, SearchArgs};

/// 🕰️ How we render instants we send to the service.
pub const CLIENT_TIME_FORMAT: &str = "%m/%d/%y %H:%M:%S:%3f";

/// 📡 The same shape, spelled the way the service spells it. Sent as `time_format` so both
/// sides agree on what `01/02/24 03:04:05:678` means.
pub const SERVICE_TIME_FORMAT: &str = "%m/%d/%y %H:%M:%S:%3N";

const REALTIME_MARKER: &str = "rt";
const REALTIME_LATEST: &str = "rt";

/// 📏 A resolved pair of bounds, ready to be dropped into `SearchArgs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBounds {
    pub earliest: String,
    pub latest: String,
}

#[derive(Debug, Clone)]
pub struct TimeRangeResolver {
    init_earliest_time: String,
    earliest_override: Option<String>,
    latest_override: Option<String>,
    field_list: Option<String>,
    last_successful_read: Option<DateTime<Local>>,
}

impl TimeRangeResolver {
    /// 🚀 Builds a resolver, or refuses loudly when `init_earliest_time` is missing.
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        let Some(init_earliest_time) = non_blank(config.init_earliest_time.as_deref()) else {
            bail!(
                "💀 init_earliest_time is mandatory and it is missing. The very first search \
                 needs somewhere to start, and we will not pick a date out of a hat for you."
            );
        };
        Ok(Self {
            init_earliest_time,
            earliest_override: non_blank(config.earliest_time.as_deref()),
            latest_override: non_blank(config.latest_time.as_deref()),
            field_list: non_blank(config.field_list.as_deref()),
            last_successful_read: None,
        })
    }

    pub fn resolve_earliest(&self, now: DateTime<Local>, realtime: bool) -> String {
        let earliest = match (self.last_successful_read, &self.earliest_override) {
            (None, _) => self.init_earliest_time.clone(),
            (Some(_), Some(explicit)) => explicit.clone(),
            (Some(last), None) if realtime => {
                // -- whole seconds, truncated. a 1.9s gap asks for "-1s", same as ever.
                // a clock that stepped backwards asks for "-0s", never "--5s"
                format!("-{}s", (now - last).num_seconds().max(0))
            }
            (Some(last), None) => format_instant(last),
        };
        if realtime {
            format!("{REALTIME_MARKER}{earliest}")
        } else {
            earliest
        }
    }

    pub fn resolve_latest(&self, now: DateTime<Local>, realtime: bool) -> String {
        match &self.latest_override {
            Some(explicit) => explicit.clone(),
            None if realtime => REALTIME_LATEST.to_string(),
            None => format_instant(now),
        }
    }

    pub fn bounds(&self, now: DateTime<Local>, realtime: bool) -> TimeBounds {
        TimeBounds {
            earliest: self.resolve_earliest(now, realtime),
            latest: self.resolve_latest(now, realtime),
        }
    }

    /// 📋 Full argument bundle for a submit at `now`.
    pub fn search_args(
        &self,
        now: DateTime<Local>,
        exec_mode: Option<ExecMode>,
        realtime: bool,
    ) -> SearchArgs {
        let TimeBounds { earliest, latest } = self.bounds(now, realtime);
        SearchArgs {
            exec_mode,
            realtime,
            earliest_time: earliest,
            latest_time: latest,
            time_format: SERVICE_TIME_FORMAT.to_string(),
            field_list: self.field_list.clone(),
        }
    }

    /// ✅ Records the submission instant of a successful read. The next window starts here.
    pub fn advance(&mut self, submitted_at: DateTime<Local>) {
        self.last_successful_read = Some(submitted_at);
    }

    pub fn last_successful_read(&self) -> Option<DateTime<Local>> {
        self.last_successful_read
    }

    /// 🗑️ Forget history. The next tick behaves like the first one.
    pub fn reset(&mut self) {
        self.last_successful_read = None;
    }
}

pub fn format_instant(instant: DateTime<Local>) -> String {
    instant.format(CLIENT_TIME_FORMAT).to_string()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}
