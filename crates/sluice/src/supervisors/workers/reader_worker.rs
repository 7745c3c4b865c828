//! 🔍 ReaderWorker: the scheduler loop. Read, forward, nap, repeat.
//!
//! A failed read is logged and counted; the next tick tries again. Retry policy lives here,
//! in the cadence, not inside the executor. The loop ends after `max_polls` reads, when the
//! stop signal flips (checked between reads, never mid-read), or when the writer hangs up. On the way out the executor is stopped,
//! which finalizes a realtime job instead of leaving it running server-side.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_channel::Sender;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::event::EventRecord;
use crate::progress::RunStats;
use crate::search::SearchExecutor;

pub(crate) struct ReaderWorker {
    executor: Arc<SearchExecutor>,
    tx: Sender<Vec<EventRecord>>,
    poll_interval: Duration,
    max_polls: Option<u64>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<RunStats>,
}

impl ReaderWorker {
    pub(crate) fn new(
        executor: Arc<SearchExecutor>,
        tx: Sender<Vec<EventRecord>>,
        poll_interval: Duration,
        max_polls: Option<u64>,
        shutdown: watch::Receiver<bool>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            executor,
            tx,
            poll_interval,
            max_polls,
            shutdown,
            stats,
        }
    }

    async fn poll_loop(&mut self) -> Result<()> {
        let mut polls = 0u64;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            polls += 1;
            // -- a read in flight always finishes; the stop signal is only heard between ticks
            let outcome = self.executor.read().await;
            match outcome {
                Ok(Some(events)) => {
                    debug!("📦 poll #{polls} read {} events", events.len());
                    self.stats.record_poll(events.len() as u64);
                    if !events.is_empty() {
                        self.tx
                            .send(events)
                            .await
                            .context("💀 The writer hung up while the reader still had events")?;
                    }
                }
                Ok(None) => {
                    debug!("💤 poll #{polls}: nothing to report this cycle");
                    self.stats.record_empty_poll();
                }
                Err(err) => {
                    error!("💀 poll #{polls} failed, trying again next tick: {err:#}");
                    self.stats.record_failed_poll();
                }
            }

            if self.max_polls.is_some_and(|max| polls >= max) {
                info!("🏁 reached {polls} polls, reader done");
                break;
            }
            tokio::select! {
                _ = stop_requested(&mut self.shutdown) => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        Ok(())
    }
}

impl Worker for ReaderWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🔍 ReaderWorker started in '{}' mode", self.executor.mode());
            let looped = self.poll_loop().await;
            if let Err(err) = self.executor.stop().await {
                warn!("⚠️ stopping the search executor did not go cleanly: {err:#}");
            }
            // -- dropping the sender is what tells the writer to finish up
            self.tx.close();
            looped
        })
    }
}

/// 🛑 Resolves once a stop is requested. A dropped sender can never ask, so that waits forever.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
