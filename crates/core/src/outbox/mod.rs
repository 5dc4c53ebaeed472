//! Outbox state: the pure transition function, the queue strategy, the
//! owned state container and snapshot rehydration.

pub mod rehydrate;
pub mod state_machine;
pub mod store;
pub mod strategy;

pub use state_machine::transition;
pub use store::{OutboxStore, SnapshotTarget};
pub use strategy::{FifoStrategy, QueueStrategy};
