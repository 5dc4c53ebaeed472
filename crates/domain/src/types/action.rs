//! Transitions accepted by the outbox state machine.

use serde::{Deserialize, Serialize};

use super::connectivity::ConnectivityStatus;
use super::intent::Intent;
use super::state::PersistedOutbox;

/// Every change to [`super::OutboxState`] is one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboxAction {
    /// Replace `online`/`netInfo`.
    ConnectivityChanged(ConnectivityStatus),
    /// Merge a persisted snapshot, resetting transient flags.
    Rehydrate(PersistedOutbox),
    /// A retry timer was armed.
    RetryScheduled,
    /// The retry timer fired or was cancelled.
    RetryCompleted,
    BusyChanged(bool),
    /// Application intent: enqueued when it carries an offline effect,
    /// removes its transaction when `meta.completed` is set, otherwise
    /// ignored.
    Intent(Intent),
    /// Back to defaults, keeping connectivity.
    Reset,
}
