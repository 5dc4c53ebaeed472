//! Send processor: drives the head transaction through the executor and
//! settles it.
//!
//! Exactly one attempt runs at a time. The `busy` flag is set when the head
//! is claimed and cleared after the outcome has been applied, whatever it
//! was. Plug-ins (executor, sink, policies) are called behind
//! `catch_unwind`, so a panicking plug-in settles the transaction instead of
//! killing the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use outpost_domain::constants::INTERNAL_ERROR_KIND;
use outpost_domain::{
    EffectError, Intent, OutboxAction, OutpostError, Result, Transaction, TransactionId,
    TransactionMeta,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::engine::EngineSignal;
use super::policy::{DiscardPolicy, RetryPolicy};
use super::ports::{CancelHandle, EffectExecutor, IntentSink, Scheduler};
use super::settlement::{SettlementError, SettlementRegistry};
use crate::outbox::OutboxStore;

/// What one send attempt ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The commit intent was applied and the transaction removed.
    Committed(TransactionId),
    /// The rollback intent was applied and the transaction removed.
    RolledBack(TransactionId),
    /// The transaction stays at the head until the timer fires.
    RetryScheduled { transaction: TransactionId, delay: Duration },
    /// Applying the settlement failed; the internal-error intent removed the
    /// transaction.
    InternalError(TransactionId),
    /// The transaction left the outbox while its effect was in flight
    /// (reset or completed elsewhere); the outcome was dropped.
    Abandoned(TransactionId),
}

/// Plug-ins the processor calls out to.
#[derive(Clone)]
pub struct ProcessorPorts {
    pub executor: Arc<dyn EffectExecutor>,
    pub sink: Arc<dyn IntentSink>,
    pub discard: Arc<dyn DiscardPolicy>,
    pub retry: Arc<dyn RetryPolicy>,
    pub scheduler: Arc<dyn Scheduler>,
}

struct PendingTimer {
    generation: u64,
    transaction: TransactionId,
    handle: Box<dyn CancelHandle>,
}

/// Serialized send loop body. Owned by the engine.
pub struct SendProcessor {
    store: Arc<OutboxStore>,
    settlements: Arc<SettlementRegistry>,
    ports: ProcessorPorts,
    timer: Mutex<Option<PendingTimer>>,
    timer_generation: AtomicU64,
    signals: mpsc::UnboundedSender<EngineSignal>,
}

impl SendProcessor {
    pub(crate) fn new(
        store: Arc<OutboxStore>,
        settlements: Arc<SettlementRegistry>,
        ports: ProcessorPorts,
        signals: mpsc::UnboundedSender<EngineSignal>,
    ) -> Self {
        Self {
            store,
            settlements,
            ports,
            timer: Mutex::new(None),
            timer_generation: AtomicU64::new(0),
            signals,
        }
    }

    /// Attempt sends until the gate closes or `cancel` fires. Returns the
    /// number of attempts made.
    pub async fn drain(&self, cancel: &CancellationToken) -> usize {
        let mut attempts = 0_usize;
        while !cancel.is_cancelled() {
            if self.attempt_next().await.is_none() {
                break;
            }
            attempts = attempts.saturating_add(1);
        }
        attempts
    }

    /// Run one attempt on the head transaction if the send gate is open.
    pub async fn attempt_next(&self) -> Option<SendOutcome> {
        let (txn, retry_count) = self.store.try_claim_head().await?;
        debug!(
            transaction = %txn.id,
            retry_count,
            method = %txn.effect.method(),
            url = %txn.effect.url,
            "Sending head transaction"
        );

        let result = AssertUnwindSafe(self.ports.executor.execute(&txn.effect))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(EffectError::internal(format!(
                    "effect executor panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        let outcome = if self.store.is_queued(&txn).await {
            match result {
                Ok(response) => self.commit(&txn, response).await,
                Err(err) => self.fail(&txn, retry_count, err).await,
            }
        } else {
            debug!(transaction = %txn.id, "Transaction left the outbox while in flight");
            SendOutcome::Abandoned(txn.id)
        };

        self.store.apply(OutboxAction::BusyChanged(false)).await;
        Some(outcome)
    }

    /// Handle a fired retry timer. Stale generations are ignored.
    pub(crate) async fn retry_due(&self, generation: u64) -> bool {
        let cleared = self
            .store
            .complete_retry(|| self.take_timer_if(|pending| pending.generation == generation))
            .await;
        if cleared {
            debug!(generation, "Retry timer fired");
        }
        cleared
    }

    /// Cancel any pending retry timer and lift the retry gate.
    pub async fn cancel_retry(&self) -> bool {
        self.store
            .complete_retry(|| {
                self.disarm_timer();
                true
            })
            .await
    }

    /// Cancel the pending retry timer if it belongs to `transaction`.
    pub(crate) async fn cancel_retry_for(&self, transaction: TransactionId) -> bool {
        self.store
            .complete_retry(|| self.take_timer_if(|pending| pending.transaction == transaction))
            .await
    }

    /// Clear the outbox, cancel the timer and reject every waiter.
    pub async fn reset(&self) -> usize {
        self.store
            .apply_then(OutboxAction::Reset, |_| {
                self.disarm_timer();
                self.settlements.reject_all(&SettlementError::Reset)
            })
            .await
    }

    async fn commit(&self, txn: &Transaction, response: Value) -> SendOutcome {
        let commit = txn.commit_intent(response);
        if let Err(err) = self.apply_to_sink(&commit) {
            return self.settle_internal(txn, &commit.kind, &err).await;
        }

        self.settlements.resolve(txn.id, commit.payload.clone());
        self.store.apply(OutboxAction::Intent(commit)).await;
        debug!(transaction = %txn.id, "Transaction committed");
        SendOutcome::Committed(txn.id)
    }

    async fn fail(&self, txn: &Transaction, retry_count: u32, err: EffectError) -> SendOutcome {
        debug!(transaction = %txn.id, retry_count, error = %err, "Effect failed");

        let discard = err.is_fatal() || self.should_discard(&err, txn, retry_count);
        if !discard {
            if let Some(delay) = self.next_delay(txn, retry_count) {
                self.store
                    .apply_then(OutboxAction::RetryScheduled, |_| self.arm_timer(txn.id, delay))
                    .await;
                debug!(
                    transaction = %txn.id,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retry scheduled"
                );
                return SendOutcome::RetryScheduled { transaction: txn.id, delay };
            }
        }

        self.rollback(txn, err).await
    }

    async fn rollback(&self, txn: &Transaction, err: EffectError) -> SendOutcome {
        let payload =
            serde_json::to_value(&err).unwrap_or_else(|_| Value::String(err.to_string()));
        let rollback = txn.rollback_intent(payload);
        if let Err(sink_err) = self.apply_to_sink(&rollback) {
            return self.settle_internal(txn, &rollback.kind, &sink_err).await;
        }

        self.settlements.reject(txn.id, SettlementError::Rejected(err));
        self.store.apply(OutboxAction::Intent(rollback)).await;
        debug!(transaction = %txn.id, "Transaction rolled back");
        SendOutcome::RolledBack(txn.id)
    }

    async fn settle_internal(
        &self,
        txn: &Transaction,
        failed_kind: &str,
        err: &OutpostError,
    ) -> SendOutcome {
        error!(
            transaction = %txn.id,
            intent = failed_kind,
            error = %err,
            "Failed to apply settlement intent"
        );

        let message = err.to_string();
        let diagnostic = Intent::new(INTERNAL_ERROR_KIND)
            .with_payload(json!({ "intent": failed_kind, "message": message }))
            .with_meta(TransactionMeta::settled(txn.id, false));

        if let Err(sink_err) = self.apply_to_sink(&diagnostic) {
            warn!(transaction = %txn.id, error = %sink_err, "Intent sink rejected internal-error intent");
        }

        self.settlements.reject(txn.id, SettlementError::Internal(message));
        self.store.apply(OutboxAction::Intent(diagnostic)).await;
        SendOutcome::InternalError(txn.id)
    }

    fn should_discard(&self, err: &EffectError, txn: &Transaction, retry_count: u32) -> bool {
        match guarded(|| self.ports.discard.discard(err, txn, retry_count)) {
            Ok(Ok(discard)) => discard,
            Ok(Err(policy_err)) => {
                warn!(transaction = %txn.id, error = %policy_err, "Discard policy failed, discarding");
                true
            }
            Err(panic) => {
                warn!(transaction = %txn.id, panic = %panic, "Discard policy panicked, discarding");
                true
            }
        }
    }

    fn next_delay(&self, txn: &Transaction, retry_count: u32) -> Option<Duration> {
        match guarded(|| self.ports.retry.retry(txn, retry_count)) {
            Ok(Ok(delay)) => delay,
            Ok(Err(policy_err)) => {
                warn!(transaction = %txn.id, error = %policy_err, "Retry policy failed, discarding");
                None
            }
            Err(panic) => {
                warn!(transaction = %txn.id, panic = %panic, "Retry policy panicked, discarding");
                None
            }
        }
    }

    fn apply_to_sink(&self, intent: &Intent) -> Result<()> {
        guarded(|| self.ports.sink.apply(intent)).unwrap_or_else(|panic| {
            Err(OutpostError::Internal(format!("intent sink panicked: {panic}")))
        })
    }

    fn arm_timer(&self, transaction: TransactionId, delay: Duration) {
        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let signals = self.signals.clone();
        let handle = self.ports.scheduler.schedule(
            delay,
            Box::new(move || {
                // The engine may already be gone.
                let _ = signals.send(EngineSignal::RetryDue(generation));
            }),
        );

        let replaced = self.timer.lock().replace(PendingTimer { generation, transaction, handle });
        if let Some(stale) = replaced {
            stale.handle.cancel();
        }
    }

    fn disarm_timer(&self) {
        if let Some(pending) = self.timer.lock().take() {
            pending.handle.cancel();
        }
    }

    fn take_timer_if(&self, matches: impl FnOnce(&PendingTimer) -> bool) -> bool {
        let mut slot = self.timer.lock();
        match slot.as_ref() {
            Some(pending) if matches(pending) => {
                if let Some(pending) = slot.take() {
                    pending.handle.cancel();
                }
                true
            }
            _ => false,
        }
    }
}

fn guarded<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
