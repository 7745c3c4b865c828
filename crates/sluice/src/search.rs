//! 🔍 Search: everything on the "pull results out of the index" side of the house.
//!
//! 🎬 *[a search head hums. five strategies walk into a bar. only one gets served per tick.]*
//!
//! 🧠 Knowledge graph:
//! - `SearchService` / `SearchJob` / `SavedSearch`: the seam to the remote service.
//!   `rest::SplunkRestService` talks HTTP; tests swap in a scripted in-memory fake.
//! - `time_range::TimeRangeResolver`: decides earliest/latest for each tick.
//! - `pager::ResultPager`: walks finished jobs page by page.
//! - `realtime::RealtimeCursor`: babysits one long-lived realtime job and its read offset.
//! - `executor::SearchExecutor`: owns all of the above and dispatches on `SearchMode`.
//!
//! ⚠️ Poll loops here are deliberate busy-waits with a fixed sleep. The remote service has no
//! push channel, so we knock, wait, and knock again. Like a landlord. 🦆

pub mod executor;
pub mod pager;
pub mod realtime;
pub mod rest;
pub mod time_range;

#[cfg(test)]
pub(crate) mod in_mem;

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Deserialize;

pub use executor::SearchExecutor;
pub use rest::{SearchServiceConfig, SplunkRestService};

/// 📄 One result row, normalized to ordered string pairs.
pub type RawRow = Vec<(String, String)>;

// ⏱️ Poll cadence defaults. Configurable, never magic.
pub(crate) const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 2000;
pub(crate) const DEFAULT_REALTIME_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const DEFAULT_SAVED_SEARCH_APP: &str = "search";

/// 🎭 The five ways to ask the service a question.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// 🧱 Submit with `exec_mode=blocking`, poll until done, page through results.
    Blocking,
    /// 🚶 Submit in the default async mode, poll until done, page through results.
    Normal,
    /// 🌊 Streaming export. No job, no polling, one continuous stream.
    Export,
    /// 📼 Dispatch a named saved search with fresh time bounds, then behave like blocking.
    #[serde(alias = "savedsearch")]
    SavedSearch,
    /// ⚡ One long-lived realtime job, read incrementally via its preview.
    Realtime,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SearchMode::Blocking => "blocking",
            SearchMode::Normal => "normal",
            SearchMode::Export => "export",
            SearchMode::SavedSearch => "saved_search",
            SearchMode::Realtime => "realtime",
        };
        f.write_str(name)
    }
}

/// 📦 Everything the reader needs to know to run one kind of search on a schedule.
#[derive(Debug, Deserialize, Clone)]
pub struct ReaderConfig {
    pub mode: SearchMode,
    /// 🔍 The query string. Required for every mode except `saved_search`.
    #[serde(default)]
    pub search: Option<String>,
    /// ⏰ Earliest bound for the very first run. Mandatory; we refuse to guess.
    #[serde(default)]
    pub init_earliest_time: Option<String>,
    /// 🔒 Verbatim earliest override, used once a prior successful read exists.
    #[serde(default)]
    pub earliest_time: Option<String>,
    /// 🔒 Verbatim latest override.
    #[serde(default)]
    pub latest_time: Option<String>,
    /// 📏 Page size for result fetches and preview windows. 0 = "everything, one go".
    #[serde(default)]
    pub count: u64,
    /// 🧹 Comma-separated field allowlist passed through as `field_list`.
    #[serde(default)]
    pub field_list: Option<String>,
    /// 📼 Saved-search name, matched exactly.
    #[serde(default)]
    pub saved_search: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,
    #[serde(default = "default_realtime_poll_interval_ms")]
    pub realtime_poll_interval_ms: u64,
    /// 📡 Where the remote service lives and how to knock.
    pub service: SearchServiceConfig,
}

fn default_job_poll_interval_ms() -> u64 {
    DEFAULT_JOB_POLL_INTERVAL_MS
}

fn default_realtime_poll_interval_ms() -> u64 {
    DEFAULT_REALTIME_POLL_INTERVAL_MS
}

/// 🏃 How the service should run a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Blocking,
    Normal,
}

impl ExecMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecMode::Blocking => "blocking",
            ExecMode::Normal => "normal",
        }
    }
}

/// 📋 The argument bundle handed to `SearchService::create_job` and `export`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchArgs {
    pub exec_mode: Option<ExecMode>,
    pub realtime: bool,
    pub earliest_time: String,
    pub latest_time: String,
    pub time_format: String,
    pub field_list: Option<String>,
}

impl SearchArgs {
    /// 📡 Wire parameters, in a stable order. Blank bounds are left out entirely.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(6);
        if let Some(exec_mode) = self.exec_mode {
            params.push(("exec_mode", exec_mode.as_str().to_string()));
        }
        if self.realtime {
            params.push(("search_mode", "realtime".to_string()));
        }
        if !self.earliest_time.trim().is_empty() {
            params.push(("earliest_time", self.earliest_time.clone()));
        }
        if !self.latest_time.trim().is_empty() {
            params.push(("latest_time", self.latest_time.clone()));
        }
        params.push(("time_format", self.time_format.clone()));
        if let Some(field_list) = self.field_list.as_deref().filter(|f| !f.trim().is_empty()) {
            params.push(("field_list", field_list.to_string()));
        }
        params
    }

    /// 🔍 Looks up one rendered parameter by name. Handy in logs and tests.
    pub fn param(&self, name: &str) -> Option<String> {
        self.to_params()
            .into_iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// 📡 The remote search service, as far as the core cares.
#[async_trait]
pub trait SearchService: Debug + Send + Sync {
    /// 🚀 Submit a query and get a job handle back.
    async fn create_job(&self, query: &str, args: &SearchArgs) -> Result<Box<dyn SearchJob>>;
    /// 🌊 Run a streaming export and hand back every row it produced.
    async fn export(&self, query: &str, args: &SearchArgs) -> Result<Vec<RawRow>>;
    /// 📼 Saved searches visible to `owner` (any owner when `None`) within `app`.
    async fn saved_searches(
        &self,
        owner: Option<&str>,
        app: &str,
    ) -> Result<Vec<Box<dyn SavedSearch>>>;
}

/// 🎫 A server-side job. Every status call may fail; callers decide what failure means.
#[async_trait]
pub trait SearchJob: Debug + Send + Sync {
    fn sid(&self) -> &str;
    async fn is_done(&self) -> Result<bool>;
    async fn is_failed(&self) -> Result<bool>;
    async fn is_ready(&self) -> Result<bool>;
    async fn result_count(&self) -> Result<u64>;
    /// 📄 `count == 0` means "all of them, starting at `offset`".
    async fn results(&self, offset: u64, count: u64) -> Result<Vec<RawRow>>;
    async fn preview_count(&self) -> Result<u64>;
    async fn preview(&self, offset: u64, count: u64) -> Result<Vec<RawRow>>;
    /// 🏁 Ask the service to finalize the job. Realtime jobs otherwise run forever.
    async fn finish(&self) -> Result<()>;
}

/// 📼 A named saved search that can be dispatched into a fresh job.
#[async_trait]
pub trait SavedSearch: Debug + Send + Sync {
    fn name(&self) -> &str;
    async fn dispatch(
        &self,
        earliest_time: &str,
        latest_time: &str,
        force_dispatch: bool,
    ) -> Result<Box<dyn SearchJob>>;
}

/// ⏰ Where "now" comes from. Real runs use the wall clock; tests bring their own.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
