//! Owned outbox state container.
//!
//! All mutation goes through [`transition`]; the snapshot is written to the
//! durable store (if any) after every applied action, while the state lock is
//! still held so writes land in transition order.

use std::sync::Arc;

use outpost_domain::{
    Intent, OutboxAction, OutboxState, OutboxStatus, Result, SnapshotMode, Transaction,
    TransactionId,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::rehydrate::read_snapshot;
use super::state_machine::transition;
use super::strategy::QueueStrategy;
use crate::sync::ports::DurableStore;

const EVENT_CAPACITY: usize = 256;

/// Where and how snapshots are written.
#[derive(Clone)]
pub struct SnapshotTarget {
    pub store: Arc<dyn DurableStore>,
    pub key: String,
    pub mode: SnapshotMode,
}

/// The single owner of [`OutboxState`].
pub struct OutboxStore {
    state: Mutex<OutboxState>,
    strategy: Arc<dyn QueueStrategy>,
    snapshot: Option<SnapshotTarget>,
    events: broadcast::Sender<OutboxAction>,
}

impl OutboxStore {
    pub fn new(strategy: Arc<dyn QueueStrategy>, snapshot: Option<SnapshotTarget>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state: Mutex::new(OutboxState::default()), strategy, snapshot, events }
    }

    /// Apply `action` and return the resulting state.
    pub async fn apply(&self, action: OutboxAction) -> OutboxState {
        self.apply_then(action, OutboxState::clone).await
    }

    /// Apply `action`, then run `inspect` on the new state before the lock is
    /// released.
    pub async fn apply_then<R>(
        &self,
        action: OutboxAction,
        inspect: impl FnOnce(&OutboxState) -> R,
    ) -> R {
        let mut state = self.state.lock().await;
        self.transition_locked(&mut state, action).await;
        inspect(&state)
    }

    /// Enqueue an intent carrying an offline effect. `on_stamped` runs under
    /// the lock with the assigned id, so nothing can settle the transaction
    /// before it returns.
    pub async fn enqueue<R>(
        &self,
        intent: Intent,
        on_stamped: impl FnOnce(TransactionId) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock().await;
        let previous = state.last_transaction;
        self.transition_locked(&mut state, OutboxAction::Intent(intent)).await;

        (state.last_transaction != previous).then(|| on_stamped(state.last_transaction))
    }

    /// Claim the head transaction for sending.
    ///
    /// Returns `None` unless the send gate is open; otherwise marks the
    /// outbox busy and returns the head plus the current retry count.
    pub async fn try_claim_head(&self) -> Option<(Transaction, u32)> {
        let mut state = self.state.lock().await;
        if !state.can_send() {
            return None;
        }

        let head = self.strategy.peek(&state.outbox)?.clone();
        self.transition_locked(&mut state, OutboxAction::BusyChanged(true)).await;
        Some((head, state.retry_count))
    }

    /// True while `txn` is still queued unchanged.
    pub async fn is_queued(&self, txn: &Transaction) -> bool {
        self.state.lock().await.outbox.iter().any(|queued| queued == txn)
    }

    /// Run `guard` under the lock, then clear `retry_scheduled` if the guard
    /// agreed and the flag is set. Returns whether the flag was cleared.
    pub async fn complete_retry(&self, guard: impl FnOnce() -> bool) -> bool {
        let mut state = self.state.lock().await;
        if !guard() || !state.retry_scheduled {
            return false;
        }
        self.transition_locked(&mut state, OutboxAction::RetryCompleted).await;
        true
    }

    /// Restore the persisted snapshot. Returns the number of transactions
    /// restored; zero when there is no store or nothing usable was saved.
    pub async fn rehydrate(&self) -> Result<usize> {
        let Some(target) = &self.snapshot else {
            return Ok(0);
        };

        let Some(persisted) = read_snapshot(target.store.as_ref(), &target.key).await? else {
            return Ok(0);
        };

        let restored = persisted.outbox.len();
        let state = self.apply(OutboxAction::Rehydrate(persisted)).await;
        info!(
            restored,
            last_transaction = %state.last_transaction,
            "Rehydrated outbox snapshot"
        );
        Ok(restored)
    }

    pub async fn snapshot(&self) -> OutboxState {
        self.state.lock().await.clone()
    }

    pub async fn status(&self) -> OutboxStatus {
        self.state.lock().await.status()
    }

    /// Every applied action, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboxAction> {
        self.events.subscribe()
    }

    async fn transition_locked(&self, state: &mut OutboxState, action: OutboxAction) {
        let current = std::mem::take(state);
        *state = transition(current, &action, self.strategy.as_ref());
        self.persist(state).await;

        // No subscribers is the normal case.
        let _ = self.events.send(action);
    }

    async fn persist(&self, state: &OutboxState) {
        let Some(target) = &self.snapshot else {
            return;
        };

        let encoded = match target.mode {
            SnapshotMode::OutboxOnly => serde_json::to_string(&state.to_persisted()),
            SnapshotMode::Full => serde_json::to_string(state),
        };

        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "Failed to encode outbox snapshot");
                return;
            }
        };

        if let Err(err) = target.store.set(&target.key, &encoded).await {
            warn!(key = %target.key, error = %err, "Failed to persist outbox snapshot");
        } else {
            debug!(pending = state.outbox.len(), "Persisted outbox snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use outpost_domain::{
        ConnectivityStatus, EffectDescriptor, OfflineEffect, OutpostError, PersistedOutbox,
        Reachability,
    };
    use parking_lot::Mutex as SyncMutex;

    use super::*;
    use crate::outbox::strategy::FifoStrategy;

    #[derive(Default)]
    struct MapStore {
        values: SyncMutex<HashMap<String, String>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl DurableStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes {
                return Err(OutpostError::Database("disk full".into()));
            }
            self.values.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.values.lock().remove(key);
            Ok(())
        }
    }

    fn store_with(backing: Arc<MapStore>, mode: SnapshotMode) -> OutboxStore {
        OutboxStore::new(
            Arc::new(FifoStrategy),
            Some(SnapshotTarget { store: backing, key: "outbox".into(), mode }),
        )
    }

    fn offline_intent(url: &str) -> Intent {
        Intent::new("test/write").with_offline(OfflineEffect::new(EffectDescriptor::new(url)))
    }

    #[tokio::test]
    async fn enqueue_reports_assigned_id_and_persists() {
        let backing = Arc::new(MapStore::default());
        let store = store_with(backing.clone(), SnapshotMode::OutboxOnly);

        let id = store.enqueue(offline_intent("/a"), |id| id).await;
        assert_eq!(id, Some(TransactionId(1)));

        let saved = backing.values.lock().get("outbox").cloned().unwrap();
        let persisted: PersistedOutbox = serde_json::from_str(&saved).unwrap();
        assert_eq!(persisted.last_transaction, TransactionId(1));
        assert!(!saved.contains("online"));
    }

    #[tokio::test]
    async fn plain_intents_are_not_stamped() {
        let store = OutboxStore::new(Arc::new(FifoStrategy), None);
        assert_eq!(store.enqueue(Intent::new("nav/open"), |id| id).await, None);
    }

    #[tokio::test]
    async fn full_mode_writes_transient_flags_too() {
        let backing = Arc::new(MapStore::default());
        let store = store_with(backing.clone(), SnapshotMode::Full);

        store
            .apply(OutboxAction::ConnectivityChanged(ConnectivityStatus::new(
                Reachability::Wifi,
                None,
            )))
            .await;

        let saved = backing.values.lock().get("outbox").cloned().unwrap();
        assert!(saved.contains("\"online\":true"));
    }

    #[tokio::test]
    async fn claim_requires_open_gate_and_sets_busy() {
        let store = OutboxStore::new(Arc::new(FifoStrategy), None);
        store.enqueue(offline_intent("/a"), |_| ()).await;

        assert!(store.try_claim_head().await.is_none(), "offline must not claim");

        store
            .apply(OutboxAction::ConnectivityChanged(ConnectivityStatus::new(
                Reachability::Ethernet,
                None,
            )))
            .await;

        let (head, retry_count) = store.try_claim_head().await.unwrap();
        assert_eq!(head.id, TransactionId(1));
        assert_eq!(retry_count, 0);
        assert!(store.snapshot().await.busy);
        assert!(store.try_claim_head().await.is_none(), "busy must not claim twice");
    }

    #[tokio::test]
    async fn write_failures_do_not_block_transitions() {
        let backing = Arc::new(MapStore { fail_writes: true, ..MapStore::default() });
        let store = store_with(backing, SnapshotMode::OutboxOnly);

        store.enqueue(offline_intent("/a"), |_| ()).await;

        assert_eq!(store.status().await.pending, 1);
    }

    #[tokio::test]
    async fn subscribers_see_applied_actions() {
        let store = OutboxStore::new(Arc::new(FifoStrategy), None);
        let mut events = store.subscribe();

        store.apply(OutboxAction::BusyChanged(true)).await;

        assert_eq!(events.recv().await.unwrap(), OutboxAction::BusyChanged(true));
    }

    #[tokio::test]
    async fn complete_retry_only_fires_when_scheduled() {
        let store = OutboxStore::new(Arc::new(FifoStrategy), None);
        assert!(!store.complete_retry(|| true).await);

        store.apply(OutboxAction::RetryScheduled).await;
        assert!(!store.complete_retry(|| false).await, "guard can veto");
        assert!(store.snapshot().await.retry_scheduled);

        assert!(store.complete_retry(|| true).await);
        assert!(!store.snapshot().await.retry_scheduled);
    }
}
