//! Shared fixtures for infra integration tests.

use std::sync::Arc;
use std::time::Duration;

use outpost_core::IntentSink;
use outpost_domain::{
    EffectDescriptor, EngineConfig, Intent, OfflineEffect, OutboxState, Result, RetryConfig,
};
use outpost_infra::OutboxContext;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;

pub const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Temporary directory holding the outbox database for one test.
pub struct TestDatabase {
    pub path: String,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("outbox.db").to_string_lossy().into_owned();
        Self { path, _temp_dir: temp_dir }
    }

    /// Engine config persisting into this database, talking to `base_url`,
    /// with short retry delays.
    pub fn config(&self, base_url: &str) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.persistence.db_path = self.path.clone();
        config.persistence.encryption_key = Some(TEST_DB_KEY.to_string());
        config.executor.base_url = Some(base_url.to_string());
        config.executor.timeout_secs = 5;
        config.retry = RetryConfig::Schedule { delays_ms: vec![10, 10, 10] };
        config
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Intent sink that records every settlement intent.
#[derive(Default)]
pub struct RecordingSink {
    applied: Mutex<Vec<Intent>>,
}

impl RecordingSink {
    pub fn applied(&self) -> Vec<Intent> {
        self.applied.lock().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.applied.lock().iter().map(|intent| intent.kind.clone()).collect()
    }
}

impl IntentSink for RecordingSink {
    fn apply(&self, intent: &Intent) -> Result<()> {
        self.applied.lock().push(intent.clone());
        Ok(())
    }
}

/// Offline POST of `json` to the relative `url`.
pub fn offline_post(kind: &str, url: &str, json: Value) -> Intent {
    Intent::new(kind).with_offline(
        OfflineEffect::new(EffectDescriptor::new(url).with_method("POST").with_json(json))
            .with_commit(Intent::new(format!("{kind}-commit")))
            .with_rollback(Intent::new(format!("{kind}-rollback"))),
    )
}

pub async fn build_context(config: EngineConfig, sink: Arc<RecordingSink>) -> OutboxContext {
    OutboxContext::builder(config, sink).build().await.expect("context should build")
}

/// Poll the context's engine until `predicate` holds, failing after five
/// seconds.
pub async fn eventually(
    context: &OutboxContext,
    predicate: impl Fn(&OutboxState) -> bool,
) -> OutboxState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = context.engine.snapshot().await;
        if predicate(&state) {
            return state;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached; state: {state:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
