//! Scheduler error types

use outpost_domain::OutpostError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Constructed outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        InfraError(OutpostError::Config(err.to_string()))
    }
}

impl From<SchedulerError> for OutpostError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}
