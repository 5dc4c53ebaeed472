//! Logging bootstrap
//!
//! Hosts call [`init_tracing`] once at startup. `RUST_LOG`, when set, wins
//! over the filter passed in.

use std::str::FromStr;

use outpost_domain::{OutpostError, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one event per line.
    #[default]
    Pretty,
    /// Newline-delimited JSON with span context.
    Json,
}

impl FromStr for LogFormat {
    type Err = OutpostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(OutpostError::Config(format!("unknown log format: {other}"))),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
/// `OutpostError::Config` if `filter` does not parse or a global subscriber
/// is already installed.
pub fn init_tracing(filter: &str, format: LogFormat) -> Result<()> {
    let filter = build_filter(filter)?;

    let layer = match format {
        LogFormat::Pretty => fmt::layer().with_target(true).compact().boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| OutpostError::Config(format!("tracing already initialised: {e}")))
}

fn build_filter(fallback: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(fallback)
        .map_err(|e| OutpostError::Config(format!("invalid log filter {fallback:?}: {e}")))
}
