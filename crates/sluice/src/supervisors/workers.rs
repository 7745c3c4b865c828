//! 🧵 Workers: the ones who actually do the work while the Supervisor takes the credit.
//!
//! - `ReaderWorker`: asks the search executor for events on a fixed cadence.
//! - `WriterWorker`: drains the channel into an `EventSink`.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use std::io::Write;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::collector::HecWriter;
use crate::event::EventRecord;

mod reader_worker;
mod writer_worker;

pub(crate) use reader_worker::ReaderWorker;
pub(crate) use writer_worker::WriterWorker;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

/// 🚰 Where read events end up.
#[derive(Debug)]
pub(crate) enum EventSink {
    /// 📮 Into an HTTP Event Collector, batched or not, as the writer is configured.
    Hec(HecWriter),
    /// 📺 One JSON object per line on stdout. Empty events print nothing.
    Stdout,
    #[cfg(test)]
    Memory(std::sync::Arc<std::sync::Mutex<Vec<EventRecord>>>),
}

impl EventSink {
    pub(crate) async fn write(&mut self, event: &EventRecord) -> Result<()> {
        match self {
            EventSink::Hec(writer) => writer.write(event).await,
            EventSink::Stdout => {
                let line = event.to_json();
                if line.is_empty() {
                    return Ok(());
                }
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{line}").context("💀 stdout refused the event. Broken pipe?")
            }
            #[cfg(test)]
            EventSink::Memory(events) => {
                events
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(event.clone());
                Ok(())
            }
        }
    }

    /// 🏁 Flush and let go. For HEC this sends whatever the batch buffer still holds.
    pub(crate) async fn close(&mut self) -> Result<()> {
        match self {
            EventSink::Hec(writer) => writer.close().await,
            EventSink::Stdout => std::io::stdout()
                .flush()
                .context("💀 stdout would not flush"),
            #[cfg(test)]
            EventSink::Memory(_) => Ok(()),
        }
    }
}
