//! 🚰 sluice: pull search results out of a Splunk-style search head on a schedule, and
//! optionally push them into an HTTP Event Collector in batches.
//!
//! 🧠 Knowledge graph:
//! - `search`: time-range resolution, the five search modes, paging, the realtime cursor.
//! - `collector`: HEC envelopes, the transport, and the batching writer.
//! - `event`: the ordered key/value record that flows between the two.
//! - `supervisors`: the thin reader → channel → writer pipeline behind `run`.

pub mod app_config;
pub mod collector;
pub mod event;
pub mod progress;
pub mod search;
mod supervisors;

use anyhow::Result;

use crate::app_config::AppConfig;
use crate::progress::StatsSnapshot;
use crate::supervisors::Supervisor;

/// 🚀 Runs the pipeline until `runtime.max_polls` reads have happened or Ctrl-C arrives.
pub async fn run(app_config: AppConfig) -> Result<StatsSnapshot> {
    Supervisor::new(app_config).run().await
}
