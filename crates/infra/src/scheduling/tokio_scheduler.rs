//! Retry timers on the tokio runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use outpost_core::sync::TimerCallback;
use outpost_core::{CancelHandle, Scheduler};
use outpost_domain::Result;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::error::SchedulerError;

/// [`Scheduler`] that runs each callback on its own sleeping task.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
    pending: Arc<AtomicUsize>,
}

impl TokioScheduler {
    /// Bind to the runtime the caller is running on.
    pub fn new() -> Result<Self> {
        let handle =
            Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        Ok(Self::from_handle(handle))
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle, pending: Arc::new(AtomicUsize::new(0)) }
    }

    /// Timers that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn CancelHandle> {
        let token = CancellationToken::new();
        let child = token.clone();
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::AcqRel);

        self.handle.spawn(async move {
            tokio::select! {
                () = child.cancelled() => {
                    trace!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "timer cancelled"
                    );
                }
                () = tokio::time::sleep(delay) => {
                    callback();
                }
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        });

        Box::new(TokioCancelHandle { token })
    }
}

struct TokioCancelHandle {
    token: CancellationToken,
}

impl CancelHandle for TokioCancelHandle {
    fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn flag_callback(flag: &Arc<AtomicBool>) -> TimerCallback {
        let flag = Arc::clone(flag);
        Box::new(move || flag.store(true, Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn callback_runs_after_delay() {
        let scheduler = TokioScheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));

        let _handle = scheduler.schedule(Duration::from_millis(500), flag_callback(&fired));
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_callback_never_runs() {
        let scheduler = TokioScheduler::new().unwrap();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule(Duration::from_millis(100), flag_callback(&fired));
        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn new_outside_runtime_is_a_config_error() {
        assert!(matches!(
            TokioScheduler::new(),
            Err(outpost_domain::OutpostError::Config(_))
        ));
    }
}
