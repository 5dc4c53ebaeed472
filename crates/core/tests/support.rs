//! Shared test doubles for `outpost-core` integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outpost_core::{CancelHandle, DurableStore, EffectExecutor, IntentSink, OutboxEngine, Scheduler};
use outpost_core::sync::TimerCallback;
use outpost_domain::{
    EffectDescriptor, EffectError, Intent, OfflineEffect, OutboxState, OutpostError, Result,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use serde_json::Value;

type Scripted = std::result::Result<Value, EffectError>;

/// Executor that replays scripted outcomes and records every call.
#[derive(Default)]
pub struct MockExecutor {
    responses: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<EffectDescriptor>>,
    latency: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockExecutor {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self { responses: Mutex::new(responses.into()), ..Self::default() }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Hold every call until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push(&self, response: Scripted) {
        self.responses.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn called_urls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|effect| effect.url.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EffectExecutor for MockExecutor {
    async fn execute(&self, effect: &EffectDescriptor) -> std::result::Result<Value, EffectError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().push(effect.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let response = self.responses.lock().pop_front().unwrap_or(Ok(Value::Null));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Sink that records every settlement intent it sees.
#[derive(Default)]
pub struct RecordingSink {
    applied: Mutex<Vec<Intent>>,
    fail_kinds: Vec<String>,
    panic_kinds: Vec<String>,
}

impl RecordingSink {
    pub fn failing_on(kind: &str) -> Self {
        Self { fail_kinds: vec![kind.to_string()], ..Self::default() }
    }

    pub fn panicking_on(kind: &str) -> Self {
        Self { panic_kinds: vec![kind.to_string()], ..Self::default() }
    }

    pub fn applied(&self) -> Vec<Intent> {
        self.applied.lock().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.applied.lock().iter().map(|intent| intent.kind.clone()).collect()
    }
}

impl IntentSink for RecordingSink {
    fn apply(&self, intent: &Intent) -> Result<()> {
        if self.panic_kinds.contains(&intent.kind) {
            panic!("sink exploded on {}", intent.kind);
        }
        if self.fail_kinds.contains(&intent.kind) {
            return Err(OutpostError::Internal(format!("cannot apply {}", intent.kind)));
        }
        self.applied.lock().push(intent.clone());
        Ok(())
    }
}

struct ManualTimer {
    delay: Duration,
    callback: Option<TimerCallback>,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler that only fires when told to.
#[derive(Default)]
pub struct ManualScheduler {
    timers: Mutex<Vec<ManualTimer>>,
}

struct ManualCancel(Arc<AtomicBool>);

impl CancelHandle for ManualCancel {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn CancelHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().push(ManualTimer {
            delay,
            callback: Some(callback),
            cancelled: Arc::clone(&cancelled),
        });
        Box::new(ManualCancel(cancelled))
    }
}

impl ManualScheduler {
    /// Every delay ever scheduled, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.timers.lock().iter().map(|timer| timer.delay).collect()
    }

    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .iter()
            .filter(|timer| timer.callback.is_some() && !timer.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Fire the oldest live timer. Returns false when none is pending.
    pub fn fire_next(&self) -> bool {
        let callback = {
            let mut timers = self.timers.lock();
            timers
                .iter_mut()
                .find(|timer| timer.callback.is_some() && !timer.cancelled.load(Ordering::SeqCst))
                .and_then(|timer| timer.callback.take())
        };
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

/// In-memory durable store.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn with(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.values.lock().insert(key.to_string(), value.to_string());
        store
    }

    pub fn read(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Intent that enqueues a POST to `url`.
pub fn offline_post(kind: &str, url: &str) -> Intent {
    Intent::new(kind).with_offline(OfflineEffect::new(EffectDescriptor::new(url).with_method("POST")))
}

/// Poll the engine until `predicate` holds, failing after two seconds.
pub async fn eventually(engine: &OutboxEngine, predicate: impl Fn(&OutboxState) -> bool) -> OutboxState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let state = engine.snapshot().await;
        if predicate(&state) {
            return state;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached; state: {state:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
