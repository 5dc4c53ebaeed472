//! Timer infrastructure for retry scheduling

pub mod error;
pub mod tokio_scheduler;

pub use error::SchedulerError;
pub use tokio_scheduler::TokioScheduler;
