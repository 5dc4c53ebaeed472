//! Durable key/value storage

pub mod kv_store;
pub mod manager;
pub mod memory_store;

pub use kv_store::SqliteKeyValueStore;
pub use manager::{DbConnection, DbManager};
pub use memory_store::MemoryKeyValueStore;
