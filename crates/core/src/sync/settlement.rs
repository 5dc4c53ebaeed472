//! Registry of external waiters keyed by transaction id.
//!
//! A waiter is registered when its transaction is stamped and settled at most
//! once: resolved with the commit payload, or rejected.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use outpost_domain::{EffectError, TransactionId};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a waiter was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    /// The effect failed and the transaction was rolled back.
    #[error("transaction rolled back: {0}")]
    Rejected(EffectError),

    /// Applying the commit or rollback failed.
    #[error("internal error while settling transaction: {0}")]
    Internal(String),

    /// The outbox was reset before the transaction settled.
    #[error("outbox reset before the transaction settled")]
    Reset,

    /// The engine went away without settling the transaction.
    #[error("engine dropped the transaction")]
    Dropped,
}

type Settlement = Result<Value, SettlementError>;

/// Awaitable outcome of one transaction.
#[derive(Debug)]
pub struct SettlementHandle {
    id: TransactionId,
    receiver: oneshot::Receiver<Settlement>,
}

impl SettlementHandle {
    pub fn id(&self) -> TransactionId {
        self.id
    }
}

impl Future for SettlementHandle {
    type Output = Settlement;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SettlementError::Dropped)))
    }
}

/// Map of pending waiters.
#[derive(Debug, Default)]
pub struct SettlementRegistry {
    waiters: Mutex<HashMap<TransactionId, oneshot::Sender<Settlement>>>,
}

impl SettlementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`. A previous waiter for the same id is
    /// rejected as dropped.
    pub fn register(&self, id: TransactionId) -> SettlementHandle {
        let (sender, receiver) = oneshot::channel();
        if let Some(stale) = self.waiters.lock().insert(id, sender) {
            let _ = stale.send(Err(SettlementError::Dropped));
        }
        SettlementHandle { id, receiver }
    }

    /// Resolve the waiter for `id`. Returns false when there was none.
    pub fn resolve(&self, id: TransactionId, payload: Value) -> bool {
        self.settle(id, Ok(payload))
    }

    /// Reject the waiter for `id`. Returns false when there was none.
    pub fn reject(&self, id: TransactionId, error: SettlementError) -> bool {
        self.settle(id, Err(error))
    }

    /// Reject every pending waiter with `error`.
    pub fn reject_all(&self, error: &SettlementError) -> usize {
        let drained: Vec<_> = self.waiters.lock().drain().collect();
        let count = drained.len();
        for (_, sender) in drained {
            let _ = sender.send(Err(error.clone()));
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }

    fn settle(&self, id: TransactionId, outcome: Settlement) -> bool {
        let Some(sender) = self.waiters.lock().remove(&id) else {
            return false;
        };
        // The caller may have dropped its handle; settlement still counts.
        let _ = sender.send(outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn resolve_delivers_payload_once() {
        let registry = SettlementRegistry::new();
        let handle = registry.register(TransactionId(1));

        assert!(registry.resolve(TransactionId(1), json!({"id": 42})));
        assert!(!registry.resolve(TransactionId(1), json!(null)));
        assert!(!registry.reject(TransactionId(1), SettlementError::Reset));

        assert_eq!(handle.await, Ok(json!({"id": 42})));
    }

    #[tokio::test]
    async fn reject_all_drains_every_waiter() {
        let registry = SettlementRegistry::new();
        let first = registry.register(TransactionId(1));
        let second = registry.register(TransactionId(2));

        assert_eq!(registry.reject_all(&SettlementError::Reset), 2);
        assert_eq!(registry.pending(), 0);
        assert_eq!(first.await, Err(SettlementError::Reset));
        assert_eq!(second.await, Err(SettlementError::Reset));
    }

    #[tokio::test]
    async fn dropping_the_registry_reports_dropped() {
        let registry = SettlementRegistry::new();
        let handle = registry.register(TransactionId(5));
        assert_eq!(handle.id(), TransactionId(5));

        drop(registry);

        assert_eq!(handle.await, Err(SettlementError::Dropped));
    }

    #[test]
    fn settling_unknown_id_is_harmless() {
        let registry = SettlementRegistry::new();
        assert!(!registry.reject(TransactionId(9), SettlementError::Dropped));
    }
}
