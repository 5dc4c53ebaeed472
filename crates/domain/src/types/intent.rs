//! Application intents and the offline-effect envelope they may carry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effect::EffectDescriptor;
use super::transaction::{TransactionId, TransactionMeta};

/// A state-changing operation dispatched by the application.
///
/// Presence of `offline` is the sole trigger for queuing; `meta.completed`
/// is the sole trigger for removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TransactionMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline: Option<OfflineEffect>,
}

impl Intent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), payload: Value::Null, meta: None, offline: None }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_meta(mut self, meta: TransactionMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_offline(mut self, offline: OfflineEffect) -> Self {
        self.offline = Some(offline);
        self
    }

    /// True when this intent asks to be queued.
    pub fn is_offline(&self) -> bool {
        self.offline.is_some()
    }

    /// Transaction id this intent settles, if it is a completion.
    pub fn completed_transaction(&self) -> Option<TransactionId> {
        self.meta.as_ref().filter(|meta| meta.is_completed()).map(|meta| meta.transaction)
    }
}

/// Side effect plus the settlement intents attached to a queued intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineEffect {
    pub effect: EffectDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Box<Intent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Box<Intent>>,
}

impl OfflineEffect {
    pub fn new(effect: EffectDescriptor) -> Self {
        Self { effect, commit: None, rollback: None }
    }

    pub fn with_commit(mut self, commit: Intent) -> Self {
        self.commit = Some(Box::new(commit));
        self
    }

    pub fn with_rollback(mut self, rollback: Intent) -> Self {
        self.rollback = Some(Box::new(rollback));
        self
    }
}
