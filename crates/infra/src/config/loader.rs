//! Configuration loader
//!
//! Loads [`EngineConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `OUTPOST_DB_PATH` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `OUTPOST_DB_PATH`: Database file path (required for env loading)
//! - `OUTPOST_DB_POOL_SIZE`: Connection pool size
//! - `OUTPOST_DB_ENCRYPTION_KEY`: Database encryption key
//! - `OUTPOST_PERSIST_ENABLED`: Whether snapshots are written (true/false)
//! - `OUTPOST_PERSIST_KEY`: Key the snapshot is stored under
//! - `OUTPOST_SNAPSHOT_MODE`: `outbox_only` or `full`
//! - `OUTPOST_BASE_URL`: Base for relative effect URLs
//! - `OUTPOST_REQUEST_TIMEOUT`: Effect request timeout in seconds
//! - `OUTPOST_USER_AGENT`: User agent sent with effects
//! - `OUTPOST_RETRY_SCHEDULE_MS`: Comma-separated retry delays
//! - `OUTPOST_DISCARD_CLIENT_ERRORS`: Discard on 4xx (true/false)
//! - `OUTPOST_PROBE_URL`: Reachability probe URL
//! - `OUTPOST_PROBE_INTERVAL`: Probe interval in seconds
//! - `OUTPOST_DEBOUNCE_MS`: Connectivity debounce window
//!
//! ## File Locations
//! The loader probes, in order, `outpost.{toml,json}` then
//! `config.{toml,json}` in the working directory, its parent and
//! grandparent, then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use outpost_domain::{EngineConfig, OutpostError, Result, RetryConfig, SnapshotMode};

const CONFIG_STEMS: [&str; 2] = ["outpost", "config"];
const CONFIG_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `OutpostError::Config` if neither the environment nor any
/// config file yields a configuration, or a present value is invalid.
pub fn load() -> Result<EngineConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Like [`load`], but an absent configuration yields the defaults.
///
/// Invalid configuration is still an error.
pub fn load_or_default() -> Result<EngineConfig> {
    if std::env::var_os("OUTPOST_DB_PATH").is_some() {
        return load_from_env();
    }
    match probe_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            tracing::info!("No configuration found, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

/// Load configuration from environment variables
///
/// `OUTPOST_DB_PATH` must be set; every other variable is optional and
/// falls back to its default.
///
/// # Errors
/// Returns `OutpostError::Config` if `OUTPOST_DB_PATH` is missing or any
/// present variable has an invalid value.
pub fn load_from_env() -> Result<EngineConfig> {
    let mut config = EngineConfig::default();

    config.persistence.db_path = env_var("OUTPOST_DB_PATH")?;
    if let Some(size) = env_parse::<u32>("OUTPOST_DB_POOL_SIZE")? {
        config.persistence.pool_size = size;
    }
    config.persistence.encryption_key = std::env::var("OUTPOST_DB_ENCRYPTION_KEY").ok();
    config.persistence.enabled = env_bool("OUTPOST_PERSIST_ENABLED", config.persistence.enabled);
    if let Ok(key) = std::env::var("OUTPOST_PERSIST_KEY") {
        config.persistence.key = key;
    }
    if let Ok(mode) = std::env::var("OUTPOST_SNAPSHOT_MODE") {
        config.persistence.snapshot = parse_snapshot_mode(&mode)?;
    }

    config.executor.base_url = std::env::var("OUTPOST_BASE_URL").ok();
    if let Some(timeout) = env_parse::<u64>("OUTPOST_REQUEST_TIMEOUT")? {
        config.executor.timeout_secs = timeout;
    }
    config.executor.user_agent = std::env::var("OUTPOST_USER_AGENT").ok();

    if let Ok(schedule) = std::env::var("OUTPOST_RETRY_SCHEDULE_MS") {
        config.retry = RetryConfig::Schedule { delays_ms: parse_schedule(&schedule)? };
    }
    config.discard.discard_client_errors =
        env_bool("OUTPOST_DISCARD_CLIENT_ERRORS", config.discard.discard_client_errors);

    config.connectivity.probe_url = std::env::var("OUTPOST_PROBE_URL").ok();
    if let Some(interval) = env_parse::<u64>("OUTPOST_PROBE_INTERVAL")? {
        config.connectivity.poll_interval_secs = interval;
    }
    if let Some(debounce) = env_parse::<u64>("OUTPOST_DEBOUNCE_MS")? {
        config.connectivity.debounce_ms = debounce;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Format is picked by extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `OutpostError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(OutpostError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            OutpostError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| OutpostError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<EngineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| OutpostError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| OutpostError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(OutpostError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    let found = candidates_in(&roots).find(|path| path.exists());
    found
}

fn candidates_in(roots: &[PathBuf]) -> impl Iterator<Item = PathBuf> + '_ {
    roots.iter().flat_map(|root| {
        CONFIG_STEMS.iter().flat_map(move |stem| {
            CONFIG_EXTENSIONS.iter().map(move |ext| root.join(format!("{stem}.{ext}")))
        })
    })
}

fn parse_snapshot_mode(raw: &str) -> Result<SnapshotMode> {
    match raw.to_ascii_lowercase().as_str() {
        "outbox_only" | "outbox" => Ok(SnapshotMode::OutboxOnly),
        "full" => Ok(SnapshotMode::Full),
        other => Err(OutpostError::Config(format!("Invalid snapshot mode: {other}"))),
    }
}

fn parse_schedule(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|e| OutpostError::Config(format!("Invalid retry delay {part:?}: {e}")))
        })
        .collect()
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        OutpostError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional numeric environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OutpostError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
