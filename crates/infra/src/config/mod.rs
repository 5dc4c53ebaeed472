//! Configuration loading
//!
//! Loads [`outpost_domain::EngineConfig`] from environment variables and
//! files.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, load_or_default, probe_config_paths};
