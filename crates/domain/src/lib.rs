//! # Outpost Domain
//!
//! Data model and error types for the offline write queue.
//!
//! This crate contains:
//! - Queue data types (Intent, Transaction, OutboxState, EffectDescriptor)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Outpost crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
