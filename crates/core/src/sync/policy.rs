//! Discard and retry policies.
//!
//! Both are consulted by the send processor after a failed attempt. They must
//! be pure; an error (or panic) from either is treated as "discard".

use std::time::Duration;

use outpost_domain::{DiscardConfig, EffectError, Result, RetryConfig, Transaction};

/// Decides whether a failed transaction is abandoned now.
pub trait DiscardPolicy: Send + Sync {
    /// `retry_count` is the number of retries already scheduled for this
    /// transaction.
    fn discard(&self, error: &EffectError, txn: &Transaction, retry_count: u32) -> Result<bool>;
}

/// Decides how long to wait before the next attempt. `None` stops retrying.
pub trait RetryPolicy: Send + Sync {
    /// Delay before attempt number `retry_count + 2`.
    fn retry(&self, txn: &Transaction, retry_count: u32) -> Result<Option<Duration>>;
}

impl<F> DiscardPolicy for F
where
    F: Fn(&EffectError, &Transaction, u32) -> Result<bool> + Send + Sync,
{
    fn discard(&self, error: &EffectError, txn: &Transaction, retry_count: u32) -> Result<bool> {
        self(error, txn, retry_count)
    }
}

impl<F> RetryPolicy for F
where
    F: Fn(&Transaction, u32) -> Result<Option<Duration>> + Send + Sync,
{
    fn retry(&self, txn: &Transaction, retry_count: u32) -> Result<Option<Duration>> {
        self(txn, retry_count)
    }
}

/// Discards client errors except the configured retryable statuses.
#[derive(Debug, Clone)]
pub struct StatusDiscardPolicy {
    discard_client_errors: bool,
    retryable_statuses: Vec<u16>,
}

impl StatusDiscardPolicy {
    pub fn new(config: &DiscardConfig) -> Self {
        Self {
            discard_client_errors: config.discard_client_errors,
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }
}

impl Default for StatusDiscardPolicy {
    fn default() -> Self {
        Self::new(&DiscardConfig::default())
    }
}

impl DiscardPolicy for StatusDiscardPolicy {
    fn discard(&self, error: &EffectError, _txn: &Transaction, _retry_count: u32) -> Result<bool> {
        if error.is_fatal() {
            return Ok(true);
        }
        if !self.discard_client_errors || !error.is_client_error() {
            return Ok(false);
        }
        Ok(error.status().map_or(true, |status| !self.retryable_statuses.contains(&status)))
    }
}

/// Fixed decay schedule: the n-th retry waits `delays[n]`.
#[derive(Debug, Clone)]
pub struct ScheduleRetryPolicy {
    delays: Vec<Duration>,
}

impl ScheduleRetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays_ms: &[u64]) -> Self {
        Self::new(delays_ms.iter().copied().map(Duration::from_millis).collect())
    }
}

impl Default for ScheduleRetryPolicy {
    fn default() -> Self {
        Self::from_millis(&outpost_domain::constants::DEFAULT_RETRY_SCHEDULE_MS)
    }
}

impl RetryPolicy for ScheduleRetryPolicy {
    fn retry(&self, _txn: &Transaction, retry_count: u32) -> Result<Option<Duration>> {
        let index = usize::try_from(retry_count).unwrap_or(usize::MAX);
        Ok(self.delays.get(index).copied())
    }
}

/// Doubling backoff: `base * 2^retry_count`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialRetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
}

impl ExponentialRetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self { base_delay, max_delay, max_retries }
    }

    fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn retry(&self, _txn: &Transaction, retry_count: u32) -> Result<Option<Duration>> {
        if retry_count >= self.max_retries {
            return Ok(None);
        }
        Ok(Some(self.delay_for(retry_count)))
    }
}

/// Build the retry policy described by `config`.
pub fn retry_policy_from_config(config: &RetryConfig) -> Box<dyn RetryPolicy> {
    match config {
        RetryConfig::Schedule { delays_ms } => Box::new(ScheduleRetryPolicy::from_millis(delays_ms)),
        RetryConfig::Exponential { base_delay_ms, max_delay_ms, max_retries } => {
            Box::new(ExponentialRetryPolicy::new(
                Duration::from_millis(*base_delay_ms),
                Duration::from_millis(*max_delay_ms),
                *max_retries,
            ))
        }
    }
}
