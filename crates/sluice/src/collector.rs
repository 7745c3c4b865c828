//! 📮 Collector: the "push events into an HTTP Event Collector" side of the house.
//!
//! 🧠 Knowledge graph:
//! - `envelope::wrap_event`: one serialized event into one `{"event":...}` envelope.
//! - `transport::HecTransport`: the HTTP client, its connection bound, and the POST itself.
//! - `hec_writer::HecWriter`: batching, the inactivity flusher, and the stop-then-restart
//!   recovery when anything on the write path goes sideways.
//!
//! 🦆 The collector does not care where events came from. It just wants them in envelopes.

pub mod envelope;
pub mod hec_writer;
pub mod transport;

use serde::Deserialize;

pub use hec_writer::HecWriter;

/// 🔧 Everything the HEC writer needs: where to send, how to authenticate, how to batch.
#[derive(Debug, Deserialize, Clone)]
pub struct HecWriterConfig {
    /// 🔒 The HEC token. Sent as `Authorization: <auth_scheme> <token>`.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// ⚠️ When true, any certificate is accepted, hostname included. A trust risk, knowingly taken.
    #[serde(default)]
    pub https: bool,
    /// 🧵 Max connections to the collector, and max concurrent POSTs.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_sourcetype")]
    pub sourcetype: String,
    /// 📦 false: one POST per event. true: buffer and flush on size, count or inactivity.
    #[serde(default)]
    pub batch_mode: bool,
    #[serde(default = "default_max_batch_size_bytes")]
    pub max_batch_size_bytes: usize,
    #[serde(default = "default_max_batch_size_events")]
    pub max_batch_size_events: usize,
    #[serde(default = "default_max_inactive_time_before_batch_flush_ms")]
    pub max_inactive_time_before_batch_flush_ms: u64,
    /// ⏱️ How often the background flusher wakes up to check for idleness.
    #[serde(default = "default_flush_check_interval_ms")]
    pub flush_check_interval_ms: u64,
    /// 🫁 gzip request bodies.
    #[serde(default)]
    pub compress: bool,
    /// 🔌 How long to wait for the TCP/TLS connection to the collector.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// ⏳ Upper bound on one whole POST. Absent means a slow collector is waited for.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_auth_scheme() -> String {
    "Splunk".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_pool_size() -> usize {
    1
}

fn default_index() -> String {
    "main".to_string()
}

fn default_source() -> String {
    "sluice".to_string()
}

fn default_sourcetype() -> String {
    "sluice_hec".to_string()
}

fn default_max_batch_size_bytes() -> usize {
    1024 * 1024
}

fn default_max_batch_size_events() -> usize {
    100
}

fn default_max_inactive_time_before_batch_flush_ms() -> u64 {
    5000
}

fn default_flush_check_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for HecWriterConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            auth_scheme: default_auth_scheme(),
            host: default_host(),
            port: default_port(),
            https: false,
            pool_size: default_pool_size(),
            index: default_index(),
            source: default_source(),
            sourcetype: default_sourcetype(),
            batch_mode: false,
            max_batch_size_bytes: default_max_batch_size_bytes(),
            max_batch_size_events: default_max_batch_size_events(),
            max_inactive_time_before_batch_flush_ms:
                default_max_inactive_time_before_batch_flush_ms(),
            flush_check_interval_ms: default_flush_check_interval_ms(),
            compress: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
        }
    }
}

impl HecWriterConfig {
    /// 📡 `{scheme}://{host}:{port}/services/collector`
    pub fn endpoint(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{}:{}/services/collector", self.host, self.port)
    }
}
