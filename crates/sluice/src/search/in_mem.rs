//! 🧪 A scripted, in-memory search service. Test-only. Knows exactly what you told it.
//!
//! Every job handle shares its state through an `Arc`, so a test can keep a handle, poke it
//! (grow the preview, break the status checks, mark it done) and watch the code under test react.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta};

use super::{Clock, RawRow, SavedSearch, SearchArgs, SearchJob, SearchService};

/// 🏭 `count` rows shaped like `[("n", "<i>"), ("host", "h<i>")]`.
pub(crate) fn rows(count: usize) -> Vec<RawRow> {
    (0..count)
        .map(|i| vec![("n".to_string(), i.to_string()), ("host".to_string(), format!("h{i}"))])
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// ⏰ A clock that only moves when a test (or a fake job) says so.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub(crate) fn at(start: DateTime<Local>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub(crate) fn advance(&self, by: TimeDelta) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *lock(&self.now)
    }
}

#[derive(Debug, Default)]
struct JobState {
    rows: Vec<RawRow>,
    preview_rows: Vec<RawRow>,
    polls_until_done: u32,
    done_polls: u32,
    polls_until_ready: u32,
    ready_polls: u32,
    forced_done: bool,
    failed: bool,
    status_broken: bool,
    finished: bool,
    completion_announced: bool,
    results_calls: Vec<(u64, u64)>,
}

#[derive(Debug, Clone)]
pub(crate) struct InMemoryJob {
    sid: String,
    state: Arc<Mutex<JobState>>,
    // -- on the first "done" answer, move this clock forward: completion happens later than submit
    completion_clock: Option<(Arc<ManualClock>, TimeDelta)>,
}

impl InMemoryJob {
    /// 🏁 A job that is already done and holds `rows`.
    pub(crate) fn finished(sid: &str, rows: Vec<RawRow>) -> Self {
        Self {
            sid: sid.to_string(),
            state: Arc::new(Mutex::new(JobState {
                rows,
                ..JobState::default()
            })),
            completion_clock: None,
        }
    }

    pub(crate) fn results_calls(&self) -> Vec<(u64, u64)> {
        lock(&self.state).results_calls.clone()
    }

    pub(crate) fn push_preview(&self, more: Vec<RawRow>) {
        lock(&self.state).preview_rows.extend(more);
    }

    pub(crate) fn break_status_checks(&self) {
        lock(&self.state).status_broken = true;
    }

    pub(crate) fn mark_done(&self) {
        lock(&self.state).forced_done = true;
    }

    pub(crate) fn done_polls(&self) -> u32 {
        lock(&self.state).done_polls
    }

    pub(crate) fn ready_polls(&self) -> u32 {
        lock(&self.state).ready_polls
    }

    pub(crate) fn is_finished(&self) -> bool {
        lock(&self.state).finished
    }
}

fn window(rows: &[RawRow], offset: u64, count: u64) -> Vec<RawRow> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
    let end = if count == 0 {
        rows.len()
    } else {
        start
            .saturating_add(usize::try_from(count).unwrap_or(usize::MAX))
            .min(rows.len())
    };
    rows[start..end].to_vec()
}

#[async_trait]
impl SearchJob for InMemoryJob {
    fn sid(&self) -> &str {
        &self.sid
    }

    async fn is_done(&self) -> Result<bool> {
        let done = {
            let mut state = lock(&self.state);
            if state.status_broken {
                bail!("status endpoint fell over");
            }
            state.done_polls = state.done_polls.saturating_add(1);
            let done = state.forced_done || state.done_polls > state.polls_until_done;
            let first_time = done && !state.completion_announced;
            if first_time {
                state.completion_announced = true;
            }
            (done, first_time)
        };
        if let (true, true) = done {
            if let Some((clock, by)) = &self.completion_clock {
                clock.advance(*by);
            }
        }
        Ok(done.0)
    }

    async fn is_failed(&self) -> Result<bool> {
        let state = lock(&self.state);
        if state.status_broken {
            bail!("status endpoint fell over");
        }
        Ok(state.failed)
    }

    async fn is_ready(&self) -> Result<bool> {
        let mut state = lock(&self.state);
        state.ready_polls += 1;
        Ok(state.ready_polls > state.polls_until_ready)
    }

    async fn result_count(&self) -> Result<u64> {
        Ok(lock(&self.state).rows.len() as u64)
    }

    async fn results(&self, offset: u64, count: u64) -> Result<Vec<RawRow>> {
        let mut state = lock(&self.state);
        state.results_calls.push((offset, count));
        Ok(window(&state.rows, offset, count))
    }

    async fn preview_count(&self) -> Result<u64> {
        Ok(lock(&self.state).preview_rows.len() as u64)
    }

    async fn preview(&self, offset: u64, count: u64) -> Result<Vec<RawRow>> {
        Ok(window(&lock(&self.state).preview_rows, offset, count))
    }

    async fn finish(&self) -> Result<()> {
        lock(&self.state).finished = true;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Dispatch {
    pub(crate) name: String,
    pub(crate) earliest_time: String,
    pub(crate) latest_time: String,
    pub(crate) force_dispatch: bool,
}

#[derive(Debug)]
struct InMemorySavedSearch {
    name: String,
    service: Arc<Shared>,
}

#[async_trait]
impl SavedSearch for InMemorySavedSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(
        &self,
        earliest_time: &str,
        latest_time: &str,
        force_dispatch: bool,
    ) -> Result<Box<dyn SearchJob>> {
        lock(&self.service.dispatches).push(Dispatch {
            name: self.name.clone(),
            earliest_time: earliest_time.to_string(),
            latest_time: latest_time.to_string(),
            force_dispatch,
        });
        Ok(Box::new(self.service.spawn_job(false)))
    }
}

#[derive(Debug, Default)]
struct Shared {
    rows: Mutex<Vec<RawRow>>,
    preview_rows: Mutex<Vec<RawRow>>,
    export_rows: Mutex<Vec<RawRow>>,
    polls_until_done: Mutex<u32>,
    polls_until_ready: Mutex<u32>,
    fail_submit: Mutex<bool>,
    saved_names: Mutex<Vec<String>>,
    saved_lookups: Mutex<Vec<(Option<String>, String)>>,
    dispatches: Mutex<Vec<Dispatch>>,
    submitted: Mutex<Vec<(String, SearchArgs)>>,
    exports: Mutex<Vec<(String, SearchArgs)>>,
    jobs: Mutex<Vec<InMemoryJob>>,
    completion_clock: Mutex<Option<(Arc<ManualClock>, TimeDelta)>>,
}

impl Shared {
    // -- realtime jobs never finish on their own; someone has to `mark_done` them
    fn spawn_job(&self, realtime: bool) -> InMemoryJob {
        let polls_until_done = if realtime {
            u32::MAX
        } else {
            *lock(&self.polls_until_done)
        };
        let mut jobs = lock(&self.jobs);
        let job = InMemoryJob {
            sid: format!("sid-{}", jobs.len() + 1),
            state: Arc::new(Mutex::new(JobState {
                rows: lock(&self.rows).clone(),
                preview_rows: lock(&self.preview_rows).clone(),
                polls_until_done,
                polls_until_ready: *lock(&self.polls_until_ready),
                ..JobState::default()
            })),
            completion_clock: lock(&self.completion_clock).clone(),
        };
        jobs.push(job.clone());
        job
    }
}

/// 📡 The fake service. Configure with the `with_*` builders, inspect with the accessors.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySearchService {
    shared: Arc<Shared>,
}

impl InMemorySearchService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rows(self, rows: Vec<RawRow>) -> Self {
        *lock(&self.shared.rows) = rows;
        self
    }

    pub(crate) fn with_preview_rows(self, rows: Vec<RawRow>) -> Self {
        *lock(&self.shared.preview_rows) = rows;
        self
    }

    pub(crate) fn with_export_rows(self, rows: Vec<RawRow>) -> Self {
        *lock(&self.shared.export_rows) = rows;
        self
    }

    pub(crate) fn with_polls_until_done(self, polls: u32) -> Self {
        *lock(&self.shared.polls_until_done) = polls;
        self
    }

    pub(crate) fn with_polls_until_ready(self, polls: u32) -> Self {
        *lock(&self.shared.polls_until_ready) = polls;
        self
    }

    pub(crate) fn with_saved_searches(self, names: &[&str]) -> Self {
        *lock(&self.shared.saved_names) = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub(crate) fn with_failing_submit(self) -> Self {
        *lock(&self.shared.fail_submit) = true;
        self
    }

    /// ⏰ Jobs move `clock` forward by `by` the first time they report done.
    pub(crate) fn with_completion_clock(self, clock: Arc<ManualClock>, by: TimeDelta) -> Self {
        *lock(&self.shared.completion_clock) = Some((clock, by));
        self
    }

    pub(crate) fn submitted(&self) -> Vec<(String, SearchArgs)> {
        lock(&self.shared.submitted).clone()
    }

    pub(crate) fn exports(&self) -> Vec<(String, SearchArgs)> {
        lock(&self.shared.exports).clone()
    }

    pub(crate) fn dispatches(&self) -> Vec<Dispatch> {
        lock(&self.shared.dispatches).clone()
    }

    pub(crate) fn saved_lookups(&self) -> Vec<(Option<String>, String)> {
        lock(&self.shared.saved_lookups).clone()
    }

    pub(crate) fn last_job(&self) -> Option<InMemoryJob> {
        lock(&self.shared.jobs).last().cloned()
    }
}

#[async_trait]
impl SearchService for InMemorySearchService {
    async fn create_job(&self, query: &str, args: &SearchArgs) -> Result<Box<dyn SearchJob>> {
        if *lock(&self.shared.fail_submit) {
            bail!("the search head said no");
        }
        lock(&self.shared.submitted).push((query.to_string(), args.clone()));
        Ok(Box::new(self.shared.spawn_job(args.realtime)))
    }

    async fn export(&self, query: &str, args: &SearchArgs) -> Result<Vec<RawRow>> {
        lock(&self.shared.exports).push((query.to_string(), args.clone()));
        Ok(lock(&self.shared.export_rows).clone())
    }

    async fn saved_searches(
        &self,
        owner: Option<&str>,
        app: &str,
    ) -> Result<Vec<Box<dyn SavedSearch>>> {
        lock(&self.shared.saved_lookups).push((owner.map(str::to_string), app.to_string()));
        Ok(lock(&self.shared.saved_names)
            .iter()
            .map(|name| {
                Box::new(InMemorySavedSearch {
                    name: name.clone(),
                    service: Arc::clone(&self.shared),
                }) as Box<dyn SavedSearch>
            })
            .collect())
    }
}
