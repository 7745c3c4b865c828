//! 🗑️ WriterWorker: takes events from the channel, hands them to the sink, asks no questions.
//!
//! A failed write is counted and logged, then the next event goes. The HEC writer has already
//! rebuilt its transport by the time we hear about it. When the channel closes, the sink is
//! closed, which flushes any batch still waiting.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{EventSink, Worker};
use crate::event::EventRecord;
use crate::progress::RunStats;

pub(crate) struct WriterWorker {
    rx: Receiver<Vec<EventRecord>>,
    sink: EventSink,
    stats: Arc<RunStats>,
}

impl WriterWorker {
    pub(crate) fn new(rx: Receiver<Vec<EventRecord>>, sink: EventSink, stats: Arc<RunStats>) -> Self {
        Self { rx, sink, stats }
    }
}

impl Worker for WriterWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📥 WriterWorker started draining channel...");
            while let Ok(events) = self.rx.recv().await {
                debug!("🪣 WriterWorker received {} events", events.len());
                for event in &events {
                    match self.sink.write(event).await {
                        Ok(()) => self.stats.record_written(),
                        Err(err) => {
                            self.stats.record_write_failure();
                            warn!("⚠️ event dropped on the way out: {err:#}");
                        }
                    }
                }
            }
            debug!("🏁 WriterWorker: channel closed. Shutting down.");
            self.sink
                .close()
                .await
                .context("💀 WriterWorker failed to close its sink")
        })
    }
}
