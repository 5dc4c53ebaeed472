//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Main error type for Outpost
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum OutpostError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Outpost operations
pub type Result<T> = std::result::Result<T, OutpostError>;

impl From<serde_json::Error> for OutpostError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Outcome of a failed effect execution.
///
/// Serialized into the rollback intent's payload, so the shape is part of the
/// contract with domain collaborators.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: request rejected by server")]
    Network { status: u16, body: Value },

    /// The call never reached the server (offline, DNS, connect, timeout).
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// Request encoding or response decoding failed.
    #[error("Serialization failure: {message}")]
    Serialization { message: String },

    /// A bug or broken invariant inside the executor.
    #[error("Internal failure: {message}")]
    Internal { message: String },
}

impl EffectError {
    pub fn network(status: u16, body: Value) -> Self {
        Self::Network { status, body }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// Serialization and internal failures cannot be fixed by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Serialization { .. } | Self::Internal { .. })
    }

    /// Whether the default classification would try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Network { status, .. } => {
                !(400..=499).contains(status) || matches!(*status, 408 | 429)
            }
            Self::Serialization { .. } | Self::Internal { .. } => false,
        }
    }
}
