//! 🎭 SearchExecutor: one read per scheduler tick, five ways to do it.
//!
//! 🎬 *[INT. SEARCH HEAD - 3AM. A scheduler knocks. The executor checks which mode it was born
//! with, sighs, and picks exactly one of five doors.]*
//!
//! | Mode          | What happens                                                          |
//! |---------------|-----------------------------------------------------------------------|
//! | Blocking      | submit with `exec_mode=blocking`, poll until done, page the results   |
//! | Normal        | submit with `exec_mode=normal`, poll until done, page the results     |
//! | Export        | streaming export, no job, no polling                                  |
//! | SavedSearch   | find by exact name, force a fresh dispatch, then act like Blocking    |
//! | Realtime      | hand over to the `RealtimeCursor`                                     |
//!
//! The submission instant is captured *before* anything goes over the wire, and that instant
//! (not the completion instant) becomes the next window's start. No gap, no overlap.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::pager::ResultPager;
use super::realtime::RealtimeCursor;
use super::time_range::TimeRangeResolver;
use super::{
    Clock, DEFAULT_SAVED_SEARCH_APP, ExecMode, ReaderConfig, SearchJob, SearchMode,
    SearchService,
};
use crate::event::EventRecord;

#[derive(Debug)]
pub struct SearchExecutor {
    mode: SearchMode,
    query: String,
    saved_search: String,
    owner: Option<String>,
    app: String,
    service: Arc<dyn SearchService>,
    clock: Arc<dyn Clock>,
    // 🔒 held only long enough to read or bump the bounds, never across an await
    resolver: Mutex<TimeRangeResolver>,
    pager: ResultPager,
    cursor: RealtimeCursor,
    // 🔒 one realtime tick at a time, from reading the clock to moving the window
    realtime_tick: tokio::sync::Mutex<()>,
    job_poll_interval: Duration,
}

impl SearchExecutor {
    /// 🚀 Validates the reader config up front. A missing `init_earliest_time`, a missing query,
    /// or a saved-search mode without a name all fail here, before any read happens.
    pub fn new(
        config: &ReaderConfig,
        service: Arc<dyn SearchService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let resolver = TimeRangeResolver::new(config)?;

        let query = config.search.clone().unwrap_or_default();
        let saved_search = config.saved_search.clone().unwrap_or_default();
        match config.mode {
            SearchMode::SavedSearch if saved_search.trim().is_empty() => {
                bail!("💀 mode 'saved_search' needs a `saved_search` name to look up")
            }
            SearchMode::SavedSearch => {}
            other if query.trim().is_empty() => {
                bail!("💀 mode '{other}' needs a `search` query. An empty query searches nothing, loudly.")
            }
            _ => {}
        }

        let app = config
            .app
            .clone()
            .filter(|app| !app.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SAVED_SEARCH_APP.to_string());
        let owner = config.owner.clone().filter(|owner| !owner.trim().is_empty());

        Ok(Self {
            mode: config.mode,
            query,
            saved_search,
            owner,
            app,
            service,
            clock,
            resolver: Mutex::new(resolver),
            pager: ResultPager::new(config.count),
            cursor: RealtimeCursor::new(
                config.count,
                Duration::from_millis(config.realtime_poll_interval_ms),
            ),
            realtime_tick: tokio::sync::Mutex::new(()),
            job_poll_interval: Duration::from_millis(config.job_poll_interval_ms),
        })
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// 📡 One read. `Ok(None)` is "nothing to report this cycle": the saved search does not
    /// exist, or the realtime job has nothing new. `Ok(Some(vec![]))` is a real, empty answer.
    pub async fn read(&self) -> Result<Option<Vec<EventRecord>>> {
        debug!("🎭 read starting in mode '{}'", self.mode);
        match self.mode {
            SearchMode::Blocking => self.run_job(ExecMode::Blocking).await.map(Some),
            SearchMode::Normal => self.run_job(ExecMode::Normal).await.map(Some),
            SearchMode::Export => self.run_export().await.map(Some),
            SearchMode::SavedSearch => self.run_saved_search().await,
            SearchMode::Realtime => self.run_realtime().await,
        }
    }

    /// 🛑 Finalizes the realtime job (if one is held) and forgets every previous read.
    pub async fn stop(&self) -> Result<()> {
        self.resolver().reset();
        self.cursor.shutdown().await
    }

    pub fn last_successful_read(&self) -> Option<DateTime<Local>> {
        self.resolver().last_successful_read()
    }

    pub async fn realtime_offset(&self) -> u64 {
        self.cursor.offset().await
    }

    fn resolver(&self) -> MutexGuard<'_, TimeRangeResolver> {
        self.resolver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn advance(&self, submitted_at: DateTime<Local>) {
        self.resolver().advance(submitted_at);
    }

    async fn run_job(&self, exec_mode: ExecMode) -> Result<Vec<EventRecord>> {
        let submitted_at = self.clock.now();
        let args = self.resolver().search_args(submitted_at, Some(exec_mode), false);
        info!(
            "🚀 submitting {} search, earliest '{}' latest '{}'",
            exec_mode.as_str(),
            args.earliest_time,
            args.latest_time
        );

        let job = self
            .service
            .create_job(&self.query, &args)
            .await
            .context("💀 Submitting the search job failed")?;
        let events = self.wait_and_collect(job.as_ref()).await?;

        self.advance(submitted_at);
        Ok(events)
    }

    async fn run_export(&self) -> Result<Vec<EventRecord>> {
        let submitted_at = self.clock.now();
        let args = self.resolver().search_args(submitted_at, None, false);
        info!(
            "🌊 starting export, earliest '{}' latest '{}'",
            args.earliest_time, args.latest_time
        );

        let rows = self
            .service
            .export(&self.query, &args)
            .await
            .context("💀 The export stream failed")?;

        self.advance(submitted_at);
        Ok(rows.into_iter().map(EventRecord::from_pairs).collect())
    }

    async fn run_saved_search(&self) -> Result<Option<Vec<EventRecord>>> {
        let submitted_at = self.clock.now();
        let bounds = self.resolver().bounds(submitted_at, false);

        let saved_searches = self
            .service
            .saved_searches(self.owner.as_deref(), &self.app)
            .await
            .with_context(|| format!("💀 Listing saved searches of app '{}' failed", self.app))?;

        // -- exact name match, and if the service lists a name twice, the last one wins
        let Some(saved) = saved_searches
            .iter()
            .rev()
            .find(|saved| saved.name() == self.saved_search)
        else {
            warn!(
                "🔍 saved search '{}' not found in app '{}'. Nothing to report this cycle.",
                self.saved_search, self.app
            );
            return Ok(None);
        };

        info!(
            "📼 dispatching saved search '{}', earliest '{}' latest '{}'",
            saved.name(),
            bounds.earliest,
            bounds.latest
        );
        let job = saved
            .dispatch(&bounds.earliest, &bounds.latest, true)
            .await
            .with_context(|| format!("💀 Dispatching saved search '{}' failed", saved.name()))?;
        let events = self.wait_and_collect(job.as_ref()).await?;

        self.advance(submitted_at);
        Ok(Some(events))
    }

    async fn run_realtime(&self) -> Result<Option<Vec<EventRecord>>> {
        // -- an overlapping tick waits here, then sees the bounds this one leaves behind
        let _tick = self.realtime_tick.lock().await;
        let submitted_at = self.clock.now();
        let args = self.resolver().search_args(submitted_at, None, true);

        let rows = self.cursor.poll(self.service.as_ref(), &self.query, &args).await?;

        // -- the job answered, even if it had nothing new: the window moves on
        self.advance(submitted_at);
        Ok(rows.map(|rows| rows.into_iter().map(EventRecord::from_pairs).collect()))
    }

    async fn wait_and_collect(&self, job: &dyn SearchJob) -> Result<Vec<EventRecord>> {
        while !job
            .is_done()
            .await
            .with_context(|| format!("💀 Status check of job '{}' failed", job.sid()))?
        {
            tokio::time::sleep(self.job_poll_interval).await;
        }
        if job
            .is_failed()
            .await
            .with_context(|| format!("💀 Status check of job '{}' failed", job.sid()))?
        {
            bail!("💀 Search job '{}' finished in a failed state", job.sid());
        }
        let events = self.pager.collect(job).await?;
        debug!("📦 job '{}' produced {} events", job.sid(), events.len());
        Ok(events)
    }
}
