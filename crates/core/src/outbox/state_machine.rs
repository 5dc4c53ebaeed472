//! The outbox state machine.
//!
//! [`transition`] is the only function allowed to produce a new
//! [`OutboxState`]. It is pure: no I/O, no clocks, no shared state.

use outpost_domain::{Intent, OutboxAction, OutboxState, PersistedOutbox, Transaction};
use tracing::warn;

use super::strategy::QueueStrategy;

/// Apply `action` to `state`.
///
/// Unknown intents leave the state untouched. Removal happens only for
/// intents whose `meta.completed` is `true`.
pub fn transition(
    mut state: OutboxState,
    action: &OutboxAction,
    strategy: &dyn QueueStrategy,
) -> OutboxState {
    match action {
        OutboxAction::ConnectivityChanged(status) => {
            state.online = status.online;
            state.net_info = status.net_info;
            state
        }
        OutboxAction::Rehydrate(persisted) => rehydrate(state, persisted),
        OutboxAction::RetryScheduled => {
            state.retry_scheduled = true;
            state.retry_count = state.retry_count.saturating_add(1);
            state
        }
        OutboxAction::RetryCompleted => {
            state.retry_scheduled = false;
            state
        }
        OutboxAction::BusyChanged(busy) => {
            state.busy = *busy;
            state
        }
        OutboxAction::Intent(intent) => apply_intent(state, intent, strategy),
        // Ids keep counting across a reset so a late result can never match
        // a newer transaction.
        OutboxAction::Reset => OutboxState {
            online: state.online,
            net_info: state.net_info,
            last_transaction: state.last_transaction,
            ..OutboxState::default()
        },
    }
}

fn apply_intent(state: OutboxState, intent: &Intent, strategy: &dyn QueueStrategy) -> OutboxState {
    if intent.is_offline() {
        return enqueue(state, intent, strategy);
    }

    match intent.completed_transaction() {
        Some(id) if state.contains(id) => {
            let mut state = state;
            state.outbox = strategy.dequeue(std::mem::take(&mut state.outbox), id);
            state.retry_count = 0;
            state
        }
        _ => state,
    }
}

fn enqueue(mut state: OutboxState, intent: &Intent, strategy: &dyn QueueStrategy) -> OutboxState {
    let id = state.last_transaction.next();

    if state.contains(id) {
        warn!(transaction = %id, "refusing to enqueue duplicate transaction id");
        return state;
    }

    let Some(txn) = Transaction::stamp(id, intent.clone()) else {
        return state;
    };

    state.outbox = strategy.enqueue(std::mem::take(&mut state.outbox), txn);
    state.last_transaction = id;
    state
}

fn rehydrate(state: OutboxState, persisted: &PersistedOutbox) -> OutboxState {
    let highest_queued = persisted.outbox.iter().map(|txn| txn.id).max().unwrap_or_default();
    let last_transaction =
        persisted.last_transaction.max(highest_queued).max(state.last_transaction);

    OutboxState {
        outbox: persisted.outbox.clone(),
        last_transaction,
        busy: false,
        retry_count: 0,
        retry_scheduled: false,
        online: state.online,
        net_info: state.net_info,
    }
}

#[cfg(test)]
mod tests {
    use outpost_domain::{
        ConnectivityStatus, EffectDescriptor, OfflineEffect, Reachability, TransactionId,
        TransactionMeta,
    };
    use serde_json::json;

    use super::*;
    use crate::outbox::strategy::FifoStrategy;

    fn apply(state: OutboxState, action: OutboxAction) -> OutboxState {
        transition(state, &action, &FifoStrategy)
    }

    fn offline(url: &str) -> OutboxAction {
        OutboxAction::Intent(
            Intent::new("test/write")
                .with_offline(OfflineEffect::new(EffectDescriptor::new(url).with_method("POST"))),
        )
    }

    fn completion(id: u64, success: bool) -> OutboxAction {
        OutboxAction::Intent(
            Intent::new("test/settled")
                .with_meta(TransactionMeta::settled(TransactionId(id), success)),
        )
    }

    fn with_two_queued() -> OutboxState {
        let state = apply(OutboxState::default(), offline("/a"));
        apply(state, offline("/b"))
    }

    #[test]
    fn enqueue_stamps_increasing_ids_in_fifo_order() {
        let state = with_two_queued();

        let ids: Vec<_> = state.outbox.iter().map(|txn| txn.id).collect();
        assert_eq!(ids, vec![TransactionId(1), TransactionId(2)]);
        assert_eq!(state.last_transaction, TransactionId(2));
        assert_eq!(state.outbox[0].effect.url, "/a");
    }

    #[test]
    fn completion_removes_matching_transaction_and_resets_retry_count() {
        let mut state = with_two_queued();
        state.retry_count = 2;

        let state = apply(state, completion(1, true));

        assert_eq!(state.outbox.len(), 1);
        assert_eq!(state.outbox[0].id, TransactionId(2));
        assert_eq!(state.retry_count, 0);
    }

    #[test]
    fn completion_of_unknown_transaction_is_a_no_op() {
        let mut state = with_two_queued();
        state.retry_count = 2;
        let before = state.clone();

        let after = apply(state, completion(99, false));

        assert_eq!(after, before);
    }

    #[test]
    fn intent_without_completion_flag_does_not_remove() {
        let state = with_two_queued();
        let pending = OutboxAction::Intent(
            Intent::new("test/progress").with_meta(TransactionMeta::pending(TransactionId(1))),
        );

        let after = apply(state.clone(), pending);

        assert_eq!(after, state);
    }

    #[test]
    fn plain_intents_pass_through() {
        let state = with_two_queued();
        let after = apply(state.clone(), OutboxAction::Intent(Intent::new("nav/open")));
        assert_eq!(after, state);
    }

    #[test]
    fn retry_scheduled_increments_and_completed_clears() {
        let state = apply(OutboxState::default(), OutboxAction::RetryScheduled);
        assert!(state.retry_scheduled);
        assert_eq!(state.retry_count, 1);

        let state = apply(state, OutboxAction::RetryScheduled);
        assert_eq!(state.retry_count, 2);

        let state = apply(state, OutboxAction::RetryCompleted);
        assert!(!state.retry_scheduled);
        assert_eq!(state.retry_count, 2);
    }

    #[test]
    fn busy_follows_explicit_payload() {
        let state = apply(OutboxState::default(), OutboxAction::BusyChanged(true));
        assert!(state.busy);
        let state = apply(state, OutboxAction::BusyChanged(false));
        assert!(!state.busy);
    }

    #[test]
    fn connectivity_change_replaces_online_and_net_info() {
        let status = ConnectivityStatus::new(Reachability::Wifi, Some(false));
        let state = apply(OutboxState::default(), OutboxAction::ConnectivityChanged(status));

        assert!(state.online);
        assert_eq!(state.net_info.reach, Reachability::Wifi);
        assert_eq!(state.net_info.is_connection_expensive, Some(false));
    }

    #[test]
    fn reset_preserves_connectivity_and_id_counter() {
        let status = ConnectivityStatus::new(Reachability::Cellular, Some(true));
        let mut state = apply(with_two_queued(), OutboxAction::ConnectivityChanged(status));
        state.busy = true;
        state.retry_scheduled = true;
        state.retry_count = 3;

        let last = state.last_transaction;
        let state = apply(state, OutboxAction::Reset);

        assert!(state.outbox.is_empty());
        assert_eq!(state.last_transaction, last);
        assert_ne!(last, TransactionId(0));
        assert!(!state.busy && !state.retry_scheduled);
        assert_eq!(state.retry_count, 0);
        assert!(state.online);
        assert_eq!(state.net_info.reach, Reachability::Cellular);
    }

    #[test]
    fn rehydrate_forces_transient_flags_and_keeps_live_connectivity() {
        let persisted_from = with_two_queued();
        let persisted = persisted_from.to_persisted();

        let mut live = OutboxState::default();
        live.online = true;
        live.net_info.reach = Reachability::Ethernet;
        live.busy = true;
        live.retry_scheduled = true;
        live.retry_count = 5;

        let state = apply(live, OutboxAction::Rehydrate(persisted));

        assert_eq!(state.outbox.len(), 2);
        assert_eq!(state.last_transaction, TransactionId(2));
        assert!(!state.busy);
        assert!(!state.retry_scheduled);
        assert_eq!(state.retry_count, 0);
        assert!(state.online);
        assert_eq!(state.net_info.reach, Reachability::Ethernet);
    }

    #[test]
    fn rehydrate_never_lets_ids_go_backwards() {
        let mut persisted = with_two_queued().to_persisted();
        persisted.last_transaction = TransactionId(0);

        let state = apply(OutboxState::default(), OutboxAction::Rehydrate(persisted));
        assert_eq!(state.last_transaction, TransactionId(2));

        let state = apply(state, offline("/c"));
        assert_eq!(state.outbox.last().map(|txn| txn.id), Some(TransactionId(3)));
    }

    #[test]
    fn enqueue_refuses_to_duplicate_an_existing_id() {
        let mut state = with_two_queued();
        // Corrupt the counter so the next id collides with a queued one.
        state.last_transaction = TransactionId(1);

        let after = apply(state.clone(), offline("/dup"));

        assert_eq!(after, state);
    }

    #[test]
    fn commit_payload_is_not_inspected_by_the_state_machine() {
        let state = with_two_queued();
        let commit = state.outbox[0].commit_intent(json!({"id": 42}));

        let state = apply(state, OutboxAction::Intent(commit));

        assert_eq!(state.outbox.len(), 1);
    }
}
