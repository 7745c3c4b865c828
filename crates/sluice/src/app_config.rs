//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing.", said every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. `SLUICE_*` environment variables form the base layer (`__` splits
//! nested keys, so `SLUICE_READER__SERVICE__TOKEN` lands in `reader.service.token`), and an
//! optional TOML file goes on top. TOML wins on conflicts.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::collector::HecWriterConfig;
use crate::search::ReaderConfig;

/// 📦 One struct to rule them all: what to read, where (if anywhere) to write, and how often.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🔍 The search side. Mandatory; a reader with nothing to read is just a sleep loop.
    pub reader: ReaderConfig,
    /// 📮 The HEC side. Absent means events go to stdout as NDJSON.
    #[serde(default)]
    pub writer: Option<HecWriterConfig>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// ⏱️ The scheduler knobs: how often to read, how much to queue, when to give up.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 🔄 Pause between two reads, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 📦 How many read results may wait for the writer before the reader blocks.
    #[serde(default = "default_queue_capacity", alias = "channel_size")]
    pub queue_capacity: usize,
    /// 🛑 Stop after this many reads. Absent means "until Ctrl-C".
    #[serde(default)]
    pub max_polls: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_queue_capacity() -> usize {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            queue_capacity: default_queue_capacity(),
            max_polls: None,
        }
    }
}

/// 🚀 Load the config from env vars, plus the TOML file if one was given.
///
/// - `None` → env vars only. No file. No assumptions.
/// - `Some` → env vars + TOML file, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("SLUICE_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SLUICE_*). \
             The file exists in our hearts, but apparently not on disk. Or it does, and a key is off.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SLUICE_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Could not make a temp file. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_a_full_config_lands_in_every_field() {
        let file = write_test_config(
            r#"
            [reader]
            mode = "saved_search"
            saved_search = "nightly"
            owner = "admin"
            init_earliest_time = "-24h"
            count = 500

            [reader.service]
            url = "https://splunk:8089"
            token = "abc"
            accept_invalid_certs = true

            [writer]
            token = "hec"
            batch_mode = true
            max_batch_size_events = 50

            [runtime]
            poll_interval_ms = 1500
            max_polls = 3
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 A valid config should parse.");

        assert_eq!(config.reader.mode, SearchMode::SavedSearch);
        assert_eq!(config.reader.saved_search.as_deref(), Some("nightly"));
        assert_eq!(config.reader.count, 500);
        assert_eq!(config.reader.job_poll_interval_ms, 2000);
        assert_eq!(config.reader.realtime_poll_interval_ms, 500);
        assert_eq!(config.reader.service.auth_scheme, "Bearer");
        assert!(config.reader.service.accept_invalid_certs);
        let writer = config.writer.expect("writer section present");
        assert!(writer.batch_mode);
        assert_eq!(writer.max_batch_size_events, 50);
        assert_eq!(writer.port, 8088);
        assert_eq!(config.runtime.poll_interval_ms, 1500);
        assert_eq!(config.runtime.max_polls, Some(3));
        assert_eq!(config.runtime.queue_capacity, 10);
    }

    #[test]
    fn the_one_where_no_writer_and_no_runtime_still_parse() {
        let file = write_test_config(
            r#"
            [reader]
            mode = "realtime"
            search = "search index=_internal"
            init_earliest_time = "-5m"

            [reader.service]
            url = "http://localhost:8089"
            "#,
        );

        let config = load_config(Some(file.path())).expect("💀 Minimal config should parse.");

        assert_eq!(config.reader.mode, SearchMode::Realtime);
        assert!(config.writer.is_none());
        assert_eq!(config.runtime.poll_interval_ms, 60_000);
        assert_eq!(config.runtime.max_polls, None);
    }

    #[test]
    fn the_one_where_an_unknown_mode_is_a_loud_failure() {
        let file = write_test_config(
            r#"
            [reader]
            mode = "psychic"
            init_earliest_time = "-5m"

            [reader.service]
            url = "http://localhost:8089"
            "#,
        );

        let err = load_config(Some(file.path())).expect_err("💀 'psychic' is not a search mode");
        assert!(err.to_string().contains("Failed to parse configuration"));
    }
}
