//! Runtime configuration for the explorer.

use std::path::Path;
use std::time::Duration;

use explorer_data::cache::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_RECEIPT_CACHE_CAPACITY};
use explorer_data::fetcher::{DEFAULT_BLOCK_BATCH_SIZE, DEFAULT_RECEIPT_BATCH_SIZE};
use explorer_data::watch::DEFAULT_POLLING_INTERVAL;
use explorer_events::event_log::DEFAULT_MAX_EVENTS;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`ExplorerConfig::rpc_url`].
pub const RPC_URL_ENV: &str = "EXPLORER_RPC_URL";

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub rpc_url: String,
    #[serde(rename = "polling_interval_ms", with = "millis")]
    pub polling_interval: Duration,
    pub block_cache_capacity: usize,
    pub receipt_cache_capacity: usize,
    pub block_batch_size: usize,
    pub receipt_batch_size: usize,
    pub max_stored_events: usize,
    /// How long latest-N views stay fresh.
    #[serde(rename = "latest_stale_time_ms", with = "millis")]
    pub latest_stale_time: Duration,
    /// How long aggregations stay fresh.
    #[serde(rename = "stats_stale_time_ms", with = "millis")]
    pub stats_stale_time: Duration,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            receipt_cache_capacity: DEFAULT_RECEIPT_CACHE_CAPACITY,
            block_batch_size: DEFAULT_BLOCK_BATCH_SIZE,
            receipt_batch_size: DEFAULT_RECEIPT_BATCH_SIZE,
            max_stored_events: DEFAULT_MAX_EVENTS,
            latest_stale_time: Duration::from_millis(1000),
            stats_stale_time: Duration::from_secs(10),
        }
    }
}

impl ExplorerConfig {
    /// Defaults with `EXPLORER_RPC_URL` applied.
    pub fn from_env() -> Self {
        Self::default().with_rpc_override(std::env::var(RPC_URL_ENV).ok())
    }

    /// Reads a JSON config file; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))?;
        Ok(config.with_rpc_override(std::env::var(RPC_URL_ENV).ok()))
    }

    /// Replaces the RPC URL when `rpc_url` is set and non-blank.
    pub fn with_rpc_override(mut self, rpc_url: Option<String>) -> Self {
        if let Some(url) = rpc_url.filter(|url| !url.trim().is_empty()) {
            self.rpc_url = url.trim().to_string();
        }
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_node() {
        let config = ExplorerConfig::default();
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.polling_interval, Duration::from_millis(1000));
        assert_eq!(config.block_cache_capacity, 1000);
        assert_eq!(config.receipt_cache_capacity, 500);
        assert_eq!(config.block_batch_size, 10);
        assert_eq!(config.receipt_batch_size, 20);
        assert_eq!(config.max_stored_events, 1000);
        assert_eq!(config.stats_stale_time, Duration::from_secs(10));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ExplorerConfig =
            serde_json::from_str(r#"{"polling_interval_ms": 250, "block_batch_size": 4}"#)
                .expect("config should parse");
        assert_eq!(config.polling_interval, Duration::from_millis(250));
        assert_eq!(config.block_batch_size, 4);
        assert_eq!(config.receipt_batch_size, 20);
    }

    #[test]
    fn blank_override_is_ignored() {
        let config = ExplorerConfig::default().with_rpc_override(Some("  ".to_string()));
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);

        let config = config.with_rpc_override(Some("http://node:8545".to_string()));
        assert_eq!(config.rpc_url, "http://node:8545");
    }
}
