//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where search heads answer slowly..."
//! 🎬 "One supervisor dared to keep asking."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor wires the thin pipeline: a `ReaderWorker` that reads on a schedule and
//! a `WriterWorker` that drains what was read into a sink, joined by one bounded channel.
//!
//! ⚠️ WORKERS ARE THE SUPERVISOR'S PRIVATE LITTLE MINIONS. `mod workers` stays private.

mod workers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use crate::app_config::{AppConfig, RuntimeConfig};
use crate::collector::HecWriter;
use crate::progress::{RunStats, StatsSnapshot};
use crate::search::{SearchExecutor, SplunkRestService, SystemClock};

pub(crate) use workers::EventSink;
use workers::{ReaderWorker, Worker, WriterWorker};

/// 📦 Holds the config and the counters. Everything else is built in `run`.
pub(crate) struct Supervisor {
    app_config: AppConfig,
    stats: Arc<RunStats>,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self {
            app_config,
            stats: Arc::new(RunStats::new()),
        }
    }

    /// 🧵 Builds the search executor and the sink, runs the pipeline until `max_polls` or
    /// Ctrl-C, and returns what happened.
    pub(crate) async fn run(self) -> Result<StatsSnapshot> {
        let reader_config = &self.app_config.reader;
        let service = SplunkRestService::new(&reader_config.service)
            .context("💀 Could not set up the search service client")?;
        let executor = SearchExecutor::new(reader_config, Arc::new(service), Arc::new(SystemClock))
            .context("💀 The reader configuration does not add up")?;

        let sink = match &self.app_config.writer {
            Some(writer_config) => {
                let writer = HecWriter::new(writer_config.clone());
                writer
                    .start()
                    .context("💀 The HEC writer would not start")?;
                EventSink::Hec(writer)
            }
            None => {
                info!("📺 no writer configured, events go to stdout as NDJSON");
                EventSink::Stdout
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("🛑 Ctrl-C received, finishing the current read and shutting down");
                let _ = stop_tx.send(true);
                // -- keep the sender alive so the reader sees the value, not a hang-up
                std::future::pending::<()>().await;
            }
        });

        let outcome = run_pipeline(
            Arc::new(executor),
            sink,
            self.app_config.runtime.clone(),
            stop_rx,
            Arc::clone(&self.stats),
        )
        .await;
        ctrl_c.abort();
        outcome?;

        Ok(self.stats.snapshot())
    }
}

/// 🚰 Reader and writer, one channel between them, both awaited to the end.
pub(crate) async fn run_pipeline(
    executor: Arc<SearchExecutor>,
    sink: EventSink,
    runtime: RuntimeConfig,
    shutdown: watch::Receiver<bool>,
    stats: Arc<RunStats>,
) -> Result<()> {
    let (tx, rx) = async_channel::bounded(runtime.queue_capacity.max(1));

    let reader = ReaderWorker::new(
        executor,
        tx,
        Duration::from_millis(runtime.poll_interval_ms),
        runtime.max_polls,
        shutdown,
        Arc::clone(&stats),
    )
    .start();
    let writer = WriterWorker::new(rx, sink, stats).start();

    for joined in futures::future::join_all([reader, writer]).await {
        joined.context("💀 A pipeline worker panicked")??;
    }
    Ok(())
}
