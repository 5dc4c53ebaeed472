//! Port interfaces for the send pipeline

use std::time::Duration;

use async_trait::async_trait;
use outpost_domain::{EffectDescriptor, EffectError, Intent, Result};
use serde_json::Value;

/// Performs exactly one outbound call per invocation.
#[async_trait]
pub trait EffectExecutor: Send + Sync {
    /// Execute `effect`, resolving with the parsed response body.
    async fn execute(&self, effect: &EffectDescriptor) -> std::result::Result<Value, EffectError>;
}

/// Injected durable key/value store holding the outbox snapshot.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Callback run when a scheduled delay elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Injectable timer capability used for retry scheduling.
pub trait Scheduler: Send + Sync {
    /// Run `callback` once after `delay`, unless cancelled first.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn CancelHandle>;
}

/// Cancels one scheduled callback. Cancelling twice, or after the callback
/// ran, does nothing.
pub trait CancelHandle: Send + Sync {
    /// Prevent the callback from running.
    fn cancel(&self);
}

/// Receives commit, rollback and internal-error intents.
///
/// This is where domain collaborators reconcile optimistic state with the
/// server outcome. Errors and panics are contained by the send processor.
pub trait IntentSink: Send + Sync {
    /// Apply one settlement intent.
    fn apply(&self, intent: &Intent) -> Result<()>;
}

impl<F> IntentSink for F
where
    F: Fn(&Intent) -> Result<()> + Send + Sync,
{
    fn apply(&self, intent: &Intent) -> Result<()> {
        self(intent)
    }
}
