//! # Outpost Core
//!
//! Pure queue logic and the send pipeline - no infrastructure dependencies.
//!
//! This crate contains:
//! - The outbox state machine and its owned state container
//! - The send processor, settlement registry and engine loop
//! - Discard/retry policies
//! - The connectivity monitor
//! - Port/adapter interfaces (traits) for executors, stores, timers and
//!   reachability sources
//!
//! ## Architecture Principles
//! - Only depends on `outpost-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod connectivity;
pub mod outbox;
pub mod sync;

pub use connectivity::{
    ConnectionQualityProbe, ConnectivityCallback, ConnectivityEvent, ConnectivityMonitor,
    ReachabilitySource,
};
pub use outbox::{transition, FifoStrategy, OutboxStore, QueueStrategy};
pub use sync::{
    CancelHandle, DiscardPolicy, DurableStore, EffectExecutor, IntentSink, OutboxEngine,
    OutboxEngineBuilder, RetryPolicy, Scheduler, SendOutcome, SettlementError, SettlementHandle,
};
