//! Outbox state, its persisted form, and the status view.

use serde::{Deserialize, Serialize};

use super::connectivity::NetInfo;
use super::transaction::{Transaction, TransactionId};

/// Queue of pending transactions plus transient runtime flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutboxState {
    pub outbox: Vec<Transaction>,
    pub last_transaction: TransactionId,
    pub busy: bool,
    pub retry_count: u32,
    pub retry_scheduled: bool,
    pub online: bool,
    pub net_info: NetInfo,
}

impl OutboxState {
    /// Level-triggered send gate.
    pub fn can_send(&self) -> bool {
        self.online && !self.busy && !self.retry_scheduled && !self.outbox.is_empty()
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.outbox.iter().any(|txn| txn.id == id)
    }

    pub fn to_persisted(&self) -> PersistedOutbox {
        PersistedOutbox { outbox: self.outbox.clone(), last_transaction: self.last_transaction }
    }

    pub fn status(&self) -> OutboxStatus {
        OutboxStatus {
            pending: self.outbox.len(),
            busy: self.busy,
            retry_count: self.retry_count,
            retry_scheduled: self.retry_scheduled,
            online: self.online,
            last_transaction: self.last_transaction,
        }
    }
}

/// Durable subset of [`OutboxState`].
///
/// Unknown fields are ignored, so a full-state snapshot deserializes into
/// this shape as well.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedOutbox {
    pub outbox: Vec<Transaction>,
    pub last_transaction: TransactionId,
}

/// What gets written to the durable store after each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    #[default]
    OutboxOnly,
    Full,
}

/// Read-only summary for UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStatus {
    pub pending: usize,
    pub busy: bool,
    pub retry_count: u32,
    pub retry_scheduled: bool,
    pub online: bool,
    pub last_transaction: TransactionId,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_state_is_idle_and_offline() {
        let state = OutboxState::default();
        assert!(state.outbox.is_empty());
        assert_eq!(state.last_transaction, TransactionId(0));
        assert!(!state.busy && !state.retry_scheduled && !state.online);
        assert!(!state.can_send());
    }

    #[test]
    fn full_snapshot_parses_as_persisted_outbox() {
        let full = json!({
            "outbox": [],
            "lastTransaction": 7,
            "busy": true,
            "retryCount": 2,
            "retryScheduled": true,
            "online": true,
            "netInfo": {"reach": "wifi", "isConnectionExpensive": false}
        });

        let persisted: PersistedOutbox = serde_json::from_value(full).unwrap();
        assert_eq!(persisted.last_transaction, TransactionId(7));
        assert!(persisted.outbox.is_empty());
    }
}
