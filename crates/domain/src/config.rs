//! Engine configuration
//!
//! Every section has sensible defaults so a partial file (or no file at all)
//! still yields a usable [`EngineConfig`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DB_PATH, DEFAULT_DB_POOL_SIZE, DEFAULT_PERSIST_KEY, DEFAULT_PROBE_INTERVAL_SECS,
    DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRYABLE_CLIENT_STATUSES,
    DEFAULT_RETRY_SCHEDULE_MS,
};
use crate::types::SnapshotMode;

/// Top-level configuration for the outbox engine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub discard: DiscardConfig,
    pub executor: ExecutorConfig,
    pub persistence: PersistenceConfig,
    pub connectivity: ConnectivityConfig,
}

/// How long to wait before the next attempt of a failing head transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryConfig {
    /// Fixed decay schedule; retries stop once the schedule is exhausted.
    Schedule { delays_ms: Vec<u64> },
    /// Doubling backoff capped at `max_delay_ms`, at most `max_retries`
    /// retries.
    Exponential { base_delay_ms: u64, max_delay_ms: u64, max_retries: u32 },
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::Schedule { delays_ms: DEFAULT_RETRY_SCHEDULE_MS.to_vec() }
    }
}

/// When a failure abandons the transaction outright
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscardConfig {
    /// Discard on 4xx responses.
    pub discard_client_errors: bool,
    /// 4xx statuses that are retried anyway.
    pub retryable_statuses: Vec<u16>,
}

impl Default for DiscardConfig {
    fn default() -> Self {
        Self {
            discard_client_errors: true,
            retryable_statuses: DEFAULT_RETRYABLE_CLIENT_STATUSES.to_vec(),
        }
    }
}

/// HTTP effect executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Prefix for relative effect URLs.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: None,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Durable snapshot settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub db_path: String,
    pub pool_size: u32,
    pub encryption_key: Option<String>,
    /// Key under which the snapshot is stored.
    pub key: String,
    pub snapshot: SnapshotMode,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: DEFAULT_DB_PATH.to_string(),
            pool_size: DEFAULT_DB_POOL_SIZE,
            encryption_key: None,
            key: DEFAULT_PERSIST_KEY.to_string(),
            snapshot: SnapshotMode::default(),
        }
    }
}

/// Reachability probing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// URL fetched by the HTTP reachability probe; no probing when unset.
    pub probe_url: Option<String>,
    pub poll_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Changes superseded within this window are not reported.
    pub debounce_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            poll_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            debounce_ms: 0,
        }
    }
}

impl ConnectivityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(
            config.retry,
            RetryConfig::Schedule { delays_ms: DEFAULT_RETRY_SCHEDULE_MS.to_vec() }
        );
        assert!(config.discard.discard_client_errors);
    }

    #[test]
    fn exponential_retry_parses_from_tagged_form() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"retry": {"kind": "exponential", "base_delay_ms": 100, "max_delay_ms": 800, "max_retries": 4}}"#,
        )
        .unwrap();

        assert_eq!(
            config.retry,
            RetryConfig::Exponential { base_delay_ms: 100, max_delay_ms: 800, max_retries: 4 }
        );
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = ConnectivityConfig { poll_interval_secs: 0, ..ConnectivityConfig::default() };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
