//! Queued transactions and their settlement markers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effect::EffectDescriptor;
use super::intent::Intent;
use crate::constants::{DEFAULT_COMMIT_KIND, DEFAULT_ROLLBACK_KIND};

/// Monotonically increasing transaction id; `0` means "none assigned yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement markers attached to intents that belong to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMeta {
    pub transaction: TransactionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TransactionMeta {
    pub fn pending(transaction: TransactionId) -> Self {
        Self { transaction, success: None, completed: None }
    }

    pub fn settled(transaction: TransactionId, success: bool) -> Self {
        Self { transaction, success: Some(success), completed: Some(true) }
    }

    pub fn is_completed(&self) -> bool {
        self.completed == Some(true)
    }
}

/// One buffered intent with its effect and settlement intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// The original intent, minus its offline envelope.
    pub intent: Intent,
    pub effect: EffectDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Intent>,
    pub meta: TransactionMeta,
}

impl Transaction {
    /// Stamp `intent` with `id`. Returns `None` for intents without an
    /// offline effect.
    pub fn stamp(id: TransactionId, mut intent: Intent) -> Option<Self> {
        let offline = intent.offline.take()?;
        let meta = TransactionMeta::pending(id);
        intent.meta = Some(meta);

        Some(Self {
            id,
            intent,
            effect: offline.effect,
            commit: offline.commit.map(|commit| *commit),
            rollback: offline.rollback.map(|rollback| *rollback),
            meta,
        })
    }

    /// Commit intent carrying the server response, marked successful and
    /// completed.
    pub fn commit_intent(&self, response: Value) -> Intent {
        let base = self.commit.clone().unwrap_or_else(|| Intent::new(DEFAULT_COMMIT_KIND));
        settle(base, self.id, true, response)
    }

    /// Rollback intent carrying the failure, marked unsuccessful and
    /// completed.
    pub fn rollback_intent(&self, error: Value) -> Intent {
        let base = self.rollback.clone().unwrap_or_else(|| Intent::new(DEFAULT_ROLLBACK_KIND));
        settle(base, self.id, false, error)
    }
}

fn settle(mut intent: Intent, id: TransactionId, success: bool, payload: Value) -> Intent {
    intent.payload = payload;
    intent.meta = Some(TransactionMeta::settled(id, success));
    intent.offline = None;
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::intent::OfflineEffect;

    fn offline_intent() -> Intent {
        Intent::new("menu/rate")
            .with_payload(json!({"dish": 7, "stars": 5}))
            .with_offline(
                OfflineEffect::new(EffectDescriptor::new("/ratings").with_method("POST"))
                    .with_commit(Intent::new("menu/rate-commit"))
                    .with_rollback(Intent::new("menu/rate-rollback")),
            )
    }

    #[test]
    fn stamp_moves_offline_envelope_into_transaction() {
        let txn = Transaction::stamp(TransactionId(3), offline_intent()).unwrap();

        assert_eq!(txn.id, TransactionId(3));
        assert!(txn.intent.offline.is_none());
        assert_eq!(txn.intent.meta, Some(TransactionMeta::pending(TransactionId(3))));
        assert_eq!(txn.effect.url, "/ratings");
        assert_eq!(txn.commit.as_ref().map(|i| i.kind.as_str()), Some("menu/rate-commit"));
    }

    #[test]
    fn stamp_ignores_plain_intents() {
        assert!(Transaction::stamp(TransactionId(1), Intent::new("nav/open")).is_none());
    }

    #[test]
    fn commit_intent_carries_response_and_completion() {
        let txn = Transaction::stamp(TransactionId(1), offline_intent()).unwrap();
        let commit = txn.commit_intent(json!({"id": 42}));

        assert_eq!(commit.kind, "menu/rate-commit");
        assert_eq!(commit.payload, json!({"id": 42}));
        assert_eq!(commit.completed_transaction(), Some(TransactionId(1)));
        assert_eq!(commit.meta.and_then(|m| m.success), Some(true));
    }

    #[test]
    fn missing_settlement_intents_fall_back_to_defaults() {
        let intent = Intent::new("news/bookmark")
            .with_offline(OfflineEffect::new(EffectDescriptor::new("/bookmarks")));
        let txn = Transaction::stamp(TransactionId(9), intent).unwrap();

        assert_eq!(txn.commit_intent(json!(null)).kind, DEFAULT_COMMIT_KIND);
        let rollback = txn.rollback_intent(json!({"type": "transport"}));
        assert_eq!(rollback.kind, DEFAULT_ROLLBACK_KIND);
        assert_eq!(rollback.meta.and_then(|m| m.success), Some(false));
    }
}
