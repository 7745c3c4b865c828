//! 📡 HecTransport: one HTTP client, one endpoint, and a bouncer at the door.
//!
//! The connection pool keeps at most `pool_size` idle connections to the collector, and a
//! semaphore with `pool_size` permits caps how many POSTs are in flight at once. Same number,
//! both limits. The pool and the route agree, like they are supposed to.
//!
//! ⚠️ HTTPS here trusts every certificate and every hostname. That is an operational shortcut
//! for collectors with self-signed certs, and a trust risk. Not a correctness one.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use super::HecWriterConfig;

#[derive(Debug, Clone)]
pub struct HecTransport {
    client: Client,
    endpoint: String,
    authorization: String,
    compress: bool,
    permits: Arc<Semaphore>,
}

impl HecTransport {
    /// 🚀 Builds the client. No request goes out here; the first POST finds out if the
    /// collector is actually home.
    pub fn connect(config: &HecWriterConfig) -> Result<Self> {
        let pool_size = config.pool_size.max(1);
        let mut builder = Client::builder()
            .pool_max_idle_per_host(pool_size)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        if let Some(request_timeout_ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(request_timeout_ms));
        }
        if config.https {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .context("💀 The HTTP client for the collector refused to be born. TLS backend, probably.")?;

        let endpoint = config.endpoint();
        debug!("📡 collector transport ready for '{endpoint}' with {pool_size} connection(s)");
        Ok(Self {
            client,
            endpoint,
            authorization: format!("{} {}", config.auth_scheme, config.token),
            compress: config.compress,
            permits: Arc::new(Semaphore::new(pool_size)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 📮 POSTs one body (one envelope, or many concatenated ones). Non-2xx is an error.
    pub async fn post(&self, body: String) -> Result<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("💀 The collector transport was shut down mid-request")?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", &self.authorization)
            .header("Content-Type", "application/json");
        let length = body.len();
        request = if self.compress {
            request
                .header("Content-Encoding", "gzip")
                .body(gzip(body.as_bytes())?)
        } else {
            request.body(body)
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("💀 POST to '{}' never landed", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let reply = response.text().await.unwrap_or_default();
            bail!("💀 The collector said '{status}' to our {length} bytes. It added: '{reply}'");
        }
        trace!("✅ {length} bytes delivered to the collector");
        Ok(())
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder
        .write_all(bytes)
        .context("💀 gzip choked on the payload")?;
    encoder.finish().context("💀 gzip could not finish the payload")
}
