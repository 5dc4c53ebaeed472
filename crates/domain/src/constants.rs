//! Engine constants
//!
//! Centralized location for the domain-level constants shared by every layer.

// Intent kinds emitted by the engine itself
pub const DEFAULT_COMMIT_KIND: &str = "outpost/default-commit";
pub const DEFAULT_ROLLBACK_KIND: &str = "outpost/default-rollback";
pub const INTERNAL_ERROR_KIND: &str = "outpost/internal-error";

// Effect executor defaults
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";
pub const DEFAULT_HTTP_METHOD: &str = "GET";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Retry decay schedule (milliseconds), indexed by retry count
pub const DEFAULT_RETRY_SCHEDULE_MS: [u64; 7] =
    [1_000, 5_000, 15_000, 50_000, 150_000, 500_000, 1_500_000];

// Statuses inside 4xx that are still worth retrying
pub const DEFAULT_RETRYABLE_CLIENT_STATUSES: [u16; 2] = [408, 429];

// Persistence
pub const DEFAULT_PERSIST_KEY: &str = "outpost:outbox";
pub const DEFAULT_DB_PATH: &str = "outpost.db";
pub const DEFAULT_DB_POOL_SIZE: u32 = 2;

// Connectivity
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
