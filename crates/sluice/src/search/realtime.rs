//! ⚡ RealtimeCursor: one realtime job, kept alive across ticks, read through its preview.
//!
//! 🎬 *[the job never finishes. it just keeps growing. like a to-do list.]*
//!
//! State machine, per poll:
//! ```text
//!   NoJob ──create──▶ JobStarting ──ready──▶ JobReady ──(done / failed / status blew up)──▶ NoJob
//! ```
//! - No job, or the held job is invalid? Create a fresh one and reset the offset to 0.
//! - Wait until the job says it is ready.
//! - `preview_count <= offset`? Nothing new yet: `Ok(None)`. Not an error, not an empty batch.
//! - Otherwise fetch `count` preview rows from `offset` and move the offset forward.
//!
//! 🔒 The whole poll runs under one lock. Two scheduler ticks overlapping here would be two
//! people editing the same bookmark. We do not do that.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{RawRow, SearchArgs, SearchJob, SearchService};

/// 🧭 Where the cursor is in its little life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    NoJob,
    JobStarting,
    JobReady,
}

#[derive(Debug)]
struct CursorState {
    job: Option<Box<dyn SearchJob>>,
    offset: u64,
    phase: CursorPhase,
}

#[derive(Debug)]
pub struct RealtimeCursor {
    state: Mutex<CursorState>,
    page_size: u64,
    ready_poll_interval: Duration,
}

impl RealtimeCursor {
    pub fn new(page_size: u64, ready_poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(CursorState {
                job: None,
                offset: 0,
                phase: CursorPhase::NoJob,
            }),
            page_size,
            ready_poll_interval,
        }
    }

    /// 📡 One realtime tick. `Ok(None)` means "nothing new since last time".
    ///
    /// `args` are only used when a new job has to be created.
    pub async fn poll(
        &self,
        service: &dyn SearchService,
        query: &str,
        args: &SearchArgs,
    ) -> Result<Option<Vec<RawRow>>> {
        let mut state = self.state.lock().await;

        let needs_new_job = match state.job.as_deref() {
            None => true,
            Some(job) => is_job_invalid(job).await,
        };
        if needs_new_job {
            state.job = None;
            state.phase = CursorPhase::JobStarting;
            let job = service
                .create_job(query, args)
                .await
                .context("💀 Could not start the realtime search job")?;
            info!("⚡ realtime job '{}' created, offset back to 0", job.sid());
            state.job = Some(job);
            state.offset = 0;
        }

        let CursorState { job, offset, phase } = &mut *state;
        let Some(job) = job.as_deref() else {
            // -- the branch above always fills the slot; this is the borrow checker's peace offering
            *phase = CursorPhase::NoJob;
            return Ok(None);
        };

        while !job
            .is_ready()
            .await
            .with_context(|| format!("💀 Readiness check of realtime job '{}' failed", job.sid()))?
        {
            tokio::time::sleep(self.ready_poll_interval).await;
        }
        *phase = CursorPhase::JobReady;

        let preview_count = job
            .preview_count()
            .await
            .with_context(|| format!("💀 Could not read preview count of job '{}'", job.sid()))?;
        if preview_count <= *offset {
            debug!("💤 realtime job '{}' has nothing new (preview {preview_count}, offset {offset})", job.sid());
            return Ok(None);
        }

        let rows = job.preview(*offset, self.page_size).await.with_context(|| {
            format!("💀 Fetching preview of job '{}' at offset {offset} failed", job.sid())
        })?;
        *offset = if self.page_size == 0 {
            preview_count
        } else {
            (*offset + self.page_size).min(preview_count)
        };
        debug!("⚡ realtime job '{}' delivered {} rows, offset now {}", job.sid(), rows.len(), offset);
        Ok(Some(rows))
    }

    /// 🗑️ Finalizes the held job (if any) and rewinds the offset. The cursor is torn down,
    /// not left running server-side.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.offset = 0;
        state.phase = CursorPhase::NoJob;
        if let Some(job) = state.job.take() {
            info!("🏁 finalizing realtime job '{}'", job.sid());
            job.finish()
                .await
                .with_context(|| format!("💀 Could not finalize realtime job '{}'", job.sid()))?;
        }
        Ok(())
    }

    pub async fn offset(&self) -> u64 {
        self.state.lock().await.offset
    }

    pub async fn phase(&self) -> CursorPhase {
        self.state.lock().await.phase
    }

    pub async fn job_sid(&self) -> Option<String> {
        self.state.lock().await.job.as_ref().map(|job| job.sid().to_string())
    }
}

// 🔍 Done, failed, or too broken to say: all three mean "start over".
async fn is_job_invalid(job: &dyn SearchJob) -> bool {
    let status = async { Ok::<bool, anyhow::Error>(job.is_done().await? || job.is_failed().await?) };
    match status.await {
        Ok(invalid) => invalid,
        Err(err) => {
            warn!("⚠️ realtime job '{}' status check failed, starting a new one: {err:#}", job.sid());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::in_mem::{InMemorySearchService, rows};

    fn cursor(page_size: u64) -> RealtimeCursor {
        RealtimeCursor::new(page_size, Duration::from_millis(1))
    }

    fn rt_args() -> SearchArgs {
        SearchArgs {
            realtime: true,
            earliest_time: "rt-1m".to_string(),
            latest_time: "rt".to_string(),
            ..SearchArgs::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_the_offset_advances_by_one_page() {
        let service = InMemorySearchService::new().with_preview_rows(rows(25));
        let cursor = cursor(10);

        let first = cursor.poll(&service, "search *", &rt_args()).await.unwrap();

        assert_eq!(first.map(|r| r.len()), Some(10));
        assert_eq!(cursor.offset().await, 10);
        assert_eq!(cursor.phase().await, CursorPhase::JobReady);
        assert_eq!(service.submitted().len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_last_page_is_short_and_the_offset_caps_at_the_total() {
        let service = InMemorySearchService::new().with_preview_rows(rows(25));
        let cursor = cursor(10);

        for _ in 0..2 {
            cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        }
        let third = cursor.poll(&service, "search *", &rt_args()).await.unwrap();

        assert_eq!(third.map(|r| r.len()), Some(5));
        assert_eq!(cursor.offset().await, 25);
        // -- same job the whole time
        assert_eq!(service.submitted().len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_nothing_new_is_none_and_the_offset_stays_put() {
        let service = InMemorySearchService::new().with_preview_rows(rows(3));
        let cursor = cursor(0);

        let first = cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        assert_eq!(first.map(|r| r.len()), Some(3));
        assert_eq!(cursor.offset().await, 3);

        let second = cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        assert!(second.is_none());
        assert_eq!(cursor.offset().await, 3);

        // -- the job grows, the cursor notices
        service.last_job().expect("job exists").push_preview(rows(2));
        let third = cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        assert_eq!(third.map(|r| r.len()), Some(2));
        assert_eq!(cursor.offset().await, 5);
    }

    #[tokio::test]
    async fn the_one_where_a_broken_status_check_gets_a_fresh_job() {
        let service = InMemorySearchService::new().with_preview_rows(rows(4));
        let cursor = cursor(2);

        cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        assert_eq!(cursor.offset().await, 2);

        service.last_job().expect("job exists").break_status_checks();
        let rows_after = cursor.poll(&service, "search *", &rt_args()).await.unwrap();

        assert_eq!(service.submitted().len(), 2, "a second job should have been created");
        assert_eq!(rows_after.map(|r| r.len()), Some(2));
        assert_eq!(cursor.offset().await, 2, "offset restarted from zero on the new job");
    }

    #[tokio::test]
    async fn the_one_where_a_done_job_is_replaced() {
        let service = InMemorySearchService::new().with_preview_rows(rows(1));
        let cursor = cursor(0);

        cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        service.last_job().expect("job exists").mark_done();
        cursor.poll(&service, "search *", &rt_args()).await.unwrap();

        assert_eq!(service.submitted().len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_the_cursor_waits_for_readiness() {
        let service = InMemorySearchService::new()
            .with_preview_rows(rows(1))
            .with_polls_until_ready(3);
        let cursor = cursor(0);

        let got = cursor.poll(&service, "search *", &rt_args()).await.unwrap();

        assert_eq!(got.map(|r| r.len()), Some(1));
        assert!(service.last_job().expect("job exists").ready_polls() >= 3);
    }

    #[tokio::test]
    async fn the_one_where_shutdown_finalizes_and_rewinds() {
        let service = InMemorySearchService::new().with_preview_rows(rows(5));
        let cursor = cursor(2);
        cursor.poll(&service, "search *", &rt_args()).await.unwrap();
        let job = service.last_job().expect("job exists");

        cursor.shutdown().await.unwrap();

        assert!(job.is_finished());
        assert_eq!(cursor.offset().await, 0);
        assert_eq!(cursor.phase().await, CursorPhase::NoJob);
        assert_eq!(cursor.job_sid().await, None);
    }
}
