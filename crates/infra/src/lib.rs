//! # Outpost Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The HTTP effect executor
//! - Durable key/value stores (SQLite/SQLCipher, in-memory)
//! - The tokio retry scheduler
//! - Reachability sources and quality probes
//! - Configuration loading and logging bootstrap
//! - [`OutboxContext`], which wires all of the above into a running engine
//!
//! ## Architecture
//! - Implements traits defined in `outpost-core`
//! - Contains all "impure" code (I/O, timers, network)

pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;
pub mod platform;
pub mod scheduling;

// Re-export commonly used items
pub use context::{OutboxContext, OutboxContextBuilder};
pub use database::{DbManager, MemoryKeyValueStore, SqliteKeyValueStore};
pub use errors::InfraError;
pub use http::{HttpEffectExecutor, HttpEffectExecutorBuilder};
pub use observability::{init_tracing, LogFormat};
pub use platform::{
    ChannelReachabilitySource, HttpReachabilityProbe, StaticQualityProbe, UnsupportedQualityProbe,
};
pub use scheduling::TokioScheduler;
