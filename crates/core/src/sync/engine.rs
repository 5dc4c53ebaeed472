//! Outbox engine: wires the store, the send processor and the settlement
//! registry together and runs the send loop.
//!
//! The loop is level-triggered. Every enqueue, connectivity change, fired
//! retry timer and completion wakes it, and it keeps attempting sends while
//! the gate (`online && !busy && !retry_scheduled && outbox non-empty`) is
//! open.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use outpost_core::sync::{EffectExecutor, IntentSink, OutboxEngine, Scheduler};
//! use outpost_domain::{ConnectivityStatus, Intent, Reachability};
//!
//! # async fn example(
//! #     executor: Arc<dyn EffectExecutor>,
//! #     sink: Arc<dyn IntentSink>,
//! #     scheduler: Arc<dyn Scheduler>,
//! # ) -> outpost_domain::Result<()> {
//! let engine = OutboxEngine::builder(executor, sink).scheduler(scheduler).build()?;
//! engine.rehydrate().await?;
//! engine.start()?;
//! engine.set_connectivity(ConnectivityStatus::new(Reachability::Wifi, None)).await;
//! # let intent = Intent::new("example");
//! if let Some(handle) = engine.dispatch(intent).await? {
//!     let _ = handle.await;
//! }
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use outpost_domain::{
    ConnectivityStatus, Intent, OutboxAction, OutboxState, OutboxStatus, OutpostError, Result,
    SnapshotMode, TransactionId,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Mutex as TokioMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::policy::{DiscardPolicy, RetryPolicy, ScheduleRetryPolicy, StatusDiscardPolicy};
use super::ports::{DurableStore, EffectExecutor, IntentSink, Scheduler};
use super::processor::{ProcessorPorts, SendProcessor};
use super::settlement::{SettlementError, SettlementHandle, SettlementRegistry};
use crate::connectivity::ConnectivityCallback;
use crate::outbox::{FifoStrategy, OutboxStore, QueueStrategy, SnapshotTarget};

const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages delivered to the send loop from outside callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineSignal {
    RetryDue(u64),
    Connectivity(ConnectivityStatus),
}

/// Builder for [`OutboxEngine`].
pub struct OutboxEngineBuilder {
    executor: Arc<dyn EffectExecutor>,
    sink: Arc<dyn IntentSink>,
    strategy: Arc<dyn QueueStrategy>,
    discard: Arc<dyn DiscardPolicy>,
    retry: Arc<dyn RetryPolicy>,
    scheduler: Option<Arc<dyn Scheduler>>,
    snapshot: Option<SnapshotTarget>,
    join_timeout: Duration,
}

impl OutboxEngineBuilder {
    pub fn strategy(mut self, strategy: Arc<dyn QueueStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn discard_policy(mut self, policy: Arc<dyn DiscardPolicy>) -> Self {
        self.discard = policy;
        self
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = policy;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Persist a snapshot under `key` after every transition.
    pub fn durable_store(
        mut self,
        store: Arc<dyn DurableStore>,
        key: impl Into<String>,
        mode: SnapshotMode,
    ) -> Self {
        self.snapshot = Some(SnapshotTarget { store, key: key.into(), mode });
        self
    }

    /// How long [`OutboxEngine::stop`] waits for the loop to finish.
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<OutboxEngine> {
        let scheduler = self
            .scheduler
            .ok_or_else(|| OutpostError::Config("outbox engine needs a retry scheduler".into()))?;

        let store = Arc::new(OutboxStore::new(self.strategy, self.snapshot));
        let settlements = Arc::new(SettlementRegistry::new());
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let processor = Arc::new(SendProcessor::new(
            Arc::clone(&store),
            Arc::clone(&settlements),
            ProcessorPorts {
                executor: self.executor,
                sink: self.sink,
                discard: self.discard,
                retry: self.retry,
                scheduler,
            },
            signal_tx.clone(),
        ));

        Ok(OutboxEngine {
            store,
            processor,
            settlements,
            kick: Arc::new(Notify::new()),
            signal_tx,
            signal_rx: Arc::new(TokioMutex::new(signal_rx)),
            join_timeout: self.join_timeout,
            cancellation: Mutex::new(CancellationToken::new()),
            task_handle: Mutex::new(None),
        })
    }
}

/// The offline outbox with its send loop.
pub struct OutboxEngine {
    store: Arc<OutboxStore>,
    processor: Arc<SendProcessor>,
    settlements: Arc<SettlementRegistry>,
    kick: Arc<Notify>,
    signal_tx: mpsc::UnboundedSender<EngineSignal>,
    signal_rx: Arc<TokioMutex<mpsc::UnboundedReceiver<EngineSignal>>>,
    join_timeout: Duration,
    cancellation: Mutex<CancellationToken>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl OutboxEngine {
    /// Start building an engine. Defaults: FIFO strategy, 4xx discard
    /// policy, decay-schedule retry policy, no persistence.
    pub fn builder(
        executor: Arc<dyn EffectExecutor>,
        sink: Arc<dyn IntentSink>,
    ) -> OutboxEngineBuilder {
        OutboxEngineBuilder {
            executor,
            sink,
            strategy: Arc::new(FifoStrategy),
            discard: Arc::new(StatusDiscardPolicy::default()),
            retry: Arc::new(ScheduleRetryPolicy::default()),
            scheduler: None,
            snapshot: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    /// Restore the persisted outbox. Usually called before
    /// [`start`](Self::start); a running loop is woken if anything came back.
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> Result<usize> {
        let restored = self.store.rehydrate().await?;
        if restored > 0 {
            self.kick();
        }
        Ok(restored)
    }

    /// Spawn the send loop.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        let mut task_handle = self.task_handle.lock();
        if task_handle.is_some() {
            return Err(OutpostError::InvalidInput("outbox engine already running".into()));
        }

        info!("Starting outbox engine");

        let cancel = CancellationToken::new();
        *self.cancellation.lock() = cancel.clone();

        let store = Arc::clone(&self.store);
        let processor = Arc::clone(&self.processor);
        let kick = Arc::clone(&self.kick);
        let signals = Arc::clone(&self.signal_rx);

        *task_handle = Some(tokio::spawn(async move {
            Self::run_loop(store, processor, kick, signals, cancel).await;
        }));

        info!("Outbox engine started");
        Ok(())
    }

    /// Cancel the send loop and wait for it to finish. An attempt already in
    /// flight is allowed to settle first.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let Some(handle) = self.task_handle.lock().take() else {
            return Err(OutpostError::InvalidInput("outbox engine not running".into()));
        };

        info!("Stopping outbox engine");
        self.cancellation.lock().cancel();

        match tokio::time::timeout(self.join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Outbox engine task panicked: {}", e);
                return Err(OutpostError::Internal("outbox engine task panicked".into()));
            }
            Err(_) => {
                warn!("Outbox engine task did not complete within timeout");
                return Err(OutpostError::Internal("outbox engine task timeout".into()));
            }
        }

        info!("Outbox engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.lock().is_some()
    }

    /// Feed an intent into the outbox.
    ///
    /// Intents carrying an offline effect are stamped and queued; the
    /// returned handle settles when the transaction commits or rolls back.
    /// Completion intents settle and remove their transaction. Anything else
    /// passes through untouched and yields `None`.
    #[instrument(skip(self, intent), fields(kind = %intent.kind))]
    pub async fn dispatch(&self, intent: Intent) -> Result<Option<SettlementHandle>> {
        if let Some(offline) = &intent.offline {
            if offline.effect.url.trim().is_empty() {
                return Err(OutpostError::InvalidInput(format!(
                    "offline effect of {} has no url",
                    intent.kind
                )));
            }
        }

        if intent.is_offline() {
            let handle = self.store.enqueue(intent, |id| self.settlements.register(id)).await;
            if let Some(handle) = &handle {
                debug!(transaction = %handle.id(), "Transaction enqueued");
                self.kick();
            }
            return Ok(handle);
        }

        if let Some(id) = intent.completed_transaction() {
            self.complete(id, intent).await;
            self.kick();
        }

        Ok(None)
    }

    /// Apply a connectivity snapshot and re-evaluate the send gate.
    pub async fn set_connectivity(&self, status: ConnectivityStatus) {
        self.store.apply(OutboxAction::ConnectivityChanged(status)).await;
        self.kick();
    }

    /// Callback for a connectivity monitor. Reports are applied by the send
    /// loop in the order they were made.
    pub fn connectivity_callback(&self) -> ConnectivityCallback {
        let signals = self.signal_tx.clone();
        Arc::new(move |status| {
            let _ = signals.send(EngineSignal::Connectivity(status));
        })
    }

    /// Skip a pending retry delay and attempt the head right away.
    #[instrument(skip(self))]
    pub async fn send_now(&self) {
        if self.processor.cancel_retry().await {
            debug!("Pending retry cancelled by manual flush");
        }
        self.kick();
    }

    /// Clear the outbox, keeping connectivity and the id counter. Every outstanding waiter is
    /// rejected with [`SettlementError::Reset`].
    #[instrument(skip(self))]
    pub async fn reset(&self) {
        let rejected = self.processor.reset().await;
        info!(rejected, "Outbox reset");
    }

    pub async fn snapshot(&self) -> OutboxState {
        self.store.snapshot().await
    }

    pub async fn status(&self) -> OutboxStatus {
        self.store.status().await
    }

    /// Every applied action, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboxAction> {
        self.store.subscribe()
    }

    async fn complete(&self, id: TransactionId, intent: Intent) {
        let success = intent.meta.and_then(|meta| meta.success) == Some(true);
        let payload = intent.payload.clone();
        let kind = intent.kind.clone();

        self.store
            .apply_then(OutboxAction::Intent(intent), |_| {
                if success {
                    self.settlements.resolve(id, payload)
                } else {
                    self.settlements.reject(
                        id,
                        SettlementError::Internal(format!("transaction {id} rolled back by {kind}")),
                    )
                }
            })
            .await;

        self.processor.cancel_retry_for(id).await;
    }

    fn kick(&self) {
        self.kick.notify_one();
    }

    async fn run_loop(
        store: Arc<OutboxStore>,
        processor: Arc<SendProcessor>,
        kick: Arc<Notify>,
        signals: Arc<TokioMutex<mpsc::UnboundedReceiver<EngineSignal>>>,
        cancel: CancellationToken,
    ) {
        let mut signals = signals.lock().await;

        loop {
            let attempts = processor.drain(&cancel).await;
            if attempts > 0 {
                debug!(attempts, "Send loop drained");
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Outbox engine loop cancelled");
                    break;
                }
                () = kick.notified() => {}
                Some(signal) = signals.recv() => match signal {
                    EngineSignal::RetryDue(generation) => {
                        processor.retry_due(generation).await;
                    }
                    EngineSignal::Connectivity(status) => {
                        store.apply(OutboxAction::ConnectivityChanged(status)).await;
                    }
                },
            }
        }
    }
}

impl Drop for OutboxEngine {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("OutboxEngine dropped while running; cancelling tasks");
            self.cancellation.lock().cancel();
        }
    }
}
