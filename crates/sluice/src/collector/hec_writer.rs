//! 📮 HecWriter: events in, envelopes out, batches when asked to.
//!
//! 🎬 *[a buffer fills. a timer ticks. two hands reach for the flush lever at once.
//! only one gets it. the mutex has seen this movie before.]*
//!
//! Non-batch mode: every `write` wraps and POSTs right away.
//!
//! Batch mode: every `write` wraps and appends to the buffer. When the buffer hits
//! `max_batch_size_bytes` or `max_batch_size_events`, it is flushed: all entries concatenated
//! with no separator (each one is a complete JSON object, and the collector reads them as a
//! stream), buffer cleared, body POSTed. A background task wakes every
//! `flush_check_interval_ms` and flushes whatever is there once the writer has been idle for
//! `max_inactive_time_before_batch_flush_ms`.
//!
//! 🔒 One async mutex guards the buffer *and* the decision to flush. The snapshot-then-clear
//! happens under it; the POST happens outside it. No interleaved batches, no double flushes.
//!
//! 💀 Failure policy: anything that goes wrong on the write path (wrapping, buffering, POST)
//! tears the transport down and builds a fresh one. The event or batch that triggered it is
//! dropped, logged, and reported back as an `Err`. Nothing is retried.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::HecWriterConfig;
use super::envelope::wrap_event;
use super::transport::HecTransport;
use crate::event::EventRecord;

/// 📦 The pending envelopes, their total size, and when the last one arrived.
#[derive(Debug)]
struct BatchBuffer {
    entries: Vec<String>,
    size_bytes: usize,
    last_activity: Instant,
}

impl BatchBuffer {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            size_bytes: 0,
            last_activity: Instant::now(),
        }
    }

    fn push(&mut self, envelope: String) {
        self.size_bytes += envelope.len();
        self.entries.push(envelope);
        self.last_activity = Instant::now();
    }

    fn is_full(&self, max_bytes: usize, max_events: usize) -> bool {
        self.size_bytes >= max_bytes || self.entries.len() >= max_events
    }

    fn is_idle(&self, threshold: Duration) -> bool {
        !self.entries.is_empty() && self.last_activity.elapsed() >= threshold
    }

    /// 🧹 Concatenates and clears. `None` when there is nothing to send.
    fn drain(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let body = self.entries.concat();
        self.entries.clear();
        self.size_bytes = 0;
        Some(body)
    }
}

#[derive(Debug)]
struct Inner {
    config: HecWriterConfig,
    buffer: Mutex<BatchBuffer>,
    transport: StdMutex<Option<HecTransport>>,
    flusher: StdMutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    restarts: AtomicU64,
}

/// 📮 Cheap to clone; every clone writes into the same buffer through the same transport.
#[derive(Debug, Clone)]
pub struct HecWriter {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HecWriter {
    /// 🏗️ A writer that is configured but not connected. Call `start` before writing.
    pub fn new(config: HecWriterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                buffer: Mutex::new(BatchBuffer::new()),
                transport: StdMutex::new(None),
                flusher: StdMutex::new(None),
                running: AtomicBool::new(false),
                restarts: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &HecWriterConfig {
        &self.inner.config
    }

    /// 🚀 Builds the transport and, in batch mode, launches the background flusher.
    /// Must be called from inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let transport = HecTransport::connect(&self.inner.config)?;
        info!(
            "🚀 HEC writer started against '{}' (batch mode: {})",
            transport.endpoint(),
            self.inner.config.batch_mode
        );
        *lock(&self.inner.transport) = Some(transport);

        if self.inner.config.batch_mode {
            let mut flusher = lock(&self.inner.flusher);
            if flusher.is_none() {
                *flusher = Some(spawn_flusher(
                    Arc::downgrade(&self.inner),
                    Duration::from_millis(self.inner.config.flush_check_interval_ms.max(1)),
                ));
            }
        }
        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// 🛑 Immediate. Stops the flusher, drops the transport, abandons any POST in flight.
    /// Whatever is still buffered stays buffered; `close` is the polite version.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(flusher) = lock(&self.inner.flusher).take() {
            flusher.abort();
        }
        lock(&self.inner.transport).take();
        debug!("🛑 HEC writer stopped");
    }

    /// 🏁 Flush what is buffered, then stop. The stop happens even if the flush fails.
    pub async fn close(&self) -> Result<()> {
        let flushed = self.flush().await;
        self.stop();
        flushed
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// 📏 `(events, bytes)` currently waiting in the buffer.
    pub async fn buffered(&self) -> (usize, usize) {
        let buffer = self.inner.buffer.lock().await;
        (buffer.entries.len(), buffer.size_bytes)
    }

    /// 🔄 How many times the transport has been torn down and rebuilt after an error.
    pub fn restarts(&self) -> u64 {
        self.inner.restarts.load(Ordering::SeqCst)
    }

    /// 📮 Writes one event. On error the transport is rebuilt and the event is gone.
    pub async fn write(&self, event: &EventRecord) -> Result<()> {
        let result = self.try_write(event).await;
        if let Err(err) = &result {
            warn!("💀 HEC write failed, event dropped, transport restarting: {err:#}");
            self.restart_transport();
        }
        result
    }

    /// 🚽 Sends whatever is buffered right now, thresholds or not.
    pub async fn flush(&self) -> Result<()> {
        let body = self.inner.buffer.lock().await.drain();
        self.send_or_restart(body).await
    }

    async fn try_write(&self, event: &EventRecord) -> Result<()> {
        let transport = self.transport()?;
        let config = &self.inner.config;
        let envelope = wrap_event(
            &event.to_json(),
            &config.index,
            &config.source,
            &config.sourcetype,
        )?;

        if !config.batch_mode {
            return transport.post(envelope).await;
        }

        let body = {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.push(envelope);
            if buffer.is_full(config.max_batch_size_bytes, config.max_batch_size_events) {
                buffer.drain()
            } else {
                None
            }
        };
        match body {
            Some(body) => {
                debug!("📦 batch threshold reached, flushing {} bytes", body.len());
                transport.post(body).await
            }
            None => Ok(()),
        }
    }

    async fn flush_if_idle(&self) {
        let threshold =
            Duration::from_millis(self.inner.config.max_inactive_time_before_batch_flush_ms);
        let body = {
            let mut buffer = self.inner.buffer.lock().await;
            if buffer.is_idle(threshold) {
                buffer.drain()
            } else {
                None
            }
        };
        if body.is_some() {
            debug!("⏰ writer idle past threshold, flushing the buffer");
        }
        if let Err(err) = self.send_or_restart(body).await {
            warn!("💀 background flush failed, batch dropped: {err:#}");
        }
    }

    async fn send_or_restart(&self, body: Option<String>) -> Result<()> {
        let Some(body) = body else {
            return Ok(());
        };
        let sent = match self.transport() {
            Ok(transport) => transport.post(body).await,
            Err(err) => Err(err),
        };
        if sent.is_err() {
            self.restart_transport();
        }
        sent
    }

    fn transport(&self) -> Result<HecTransport> {
        match lock(&self.inner.transport).as_ref() {
            Some(transport) => Ok(transport.clone()),
            None => bail!("💀 The HEC writer is not started. No transport, no delivery."),
        }
    }

    /// 🔄 Stop-then-start of the transport. The buffer and the flusher live on.
    fn restart_transport(&self) {
        if !self.is_running() {
            return;
        }
        self.inner.restarts.fetch_add(1, Ordering::SeqCst);
        let mut slot = lock(&self.inner.transport);
        slot.take();
        match HecTransport::connect(&self.inner.config) {
            Ok(transport) => {
                info!("🔄 HEC transport rebuilt after a failure");
                *slot = Some(transport);
            }
            Err(err) => error!("💀 HEC transport could not be rebuilt: {err:#}"),
        }
    }
}

fn spawn_flusher(inner: Weak<Inner>, check_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(check_interval).await;
            // -- the writer is gone, and so is our reason to exist
            let Some(inner) = inner.upgrade() else {
                return;
            };
            HecWriter { inner }.flush_if_idle().await;
        }
    })
}
