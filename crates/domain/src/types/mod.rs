//! Domain types and models
//!
//! Everything the outbox persists or passes between layers lives here.

pub mod action;
pub mod connectivity;
pub mod effect;
pub mod intent;
pub mod state;
pub mod transaction;

pub use action::OutboxAction;
pub use connectivity::{AppState, ConnectivityStatus, NetInfo, Reachability};
pub use effect::{EffectBody, EffectDescriptor, MultipartField};
pub use intent::{Intent, OfflineEffect};
pub use state::{OutboxState, OutboxStatus, PersistedOutbox, SnapshotMode};
pub use transaction::{Transaction, TransactionId, TransactionMeta};
