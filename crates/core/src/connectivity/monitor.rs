//! Connectivity monitor.
//!
//! Turns raw platform reachability into the two-valued signal the engine
//! consumes and reports it through a callback whenever it changes. A
//! baseline fetch runs at start unless a live event gets there first.
//! Reports are generation-stamped: a change that is superseded while its
//! quality probe (or debounce window) is pending is never reported.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use outpost_domain::{
    AppState, ConnectivityConfig, ConnectivityStatus, OutpostError, Reachability, Result,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ports::{
    ConnectionQualityProbe, ConnectivityCallback, ConnectivityEvent, ReachabilitySource,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct MonitorInner {
    source: Arc<dyn ReachabilitySource>,
    quality: Arc<dyn ConnectionQualityProbe>,
    debounce: Duration,
    last: Mutex<Option<(Reachability, bool)>>,
    initialized: AtomicBool,
    generation: AtomicU64,
    callback: Mutex<Option<ConnectivityCallback>>,
}

impl MonitorInner {
    fn update(self: &Arc<Self>, reach: Reachability) -> bool {
        let online = reach.is_connected();
        {
            let mut last = self.last.lock();
            if *last == Some((reach, online)) {
                return false;
            }
            *last = Some((reach, online));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        debug!(reach = %reach, online, generation, "Reachability changed");

        let Some(callback) = self.callback.lock().clone() else {
            return true;
        };

        match Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(self);
                runtime.spawn(async move { inner.report(generation, reach, callback).await });
            }
            Err(err) => warn!(error = %err, "No runtime to report connectivity change on"),
        }
        true
    }

    async fn report(&self, generation: u64, reach: Reachability, callback: ConnectivityCallback) {
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }
        if self.is_superseded(generation) {
            debug!(generation, "Connectivity change superseded before report");
            return;
        }

        let expensive = match self.quality.is_connection_expensive().await {
            Ok(expensive) => Some(expensive),
            Err(err) => {
                debug!(error = %err, "Connection quality unavailable");
                None
            }
        };
        if self.is_superseded(generation) {
            debug!(generation, "Connectivity change superseded during quality probe");
            return;
        }

        callback(ConnectivityStatus::new(reach, expensive));
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    async fn refresh(self: &Arc<Self>) {
        match self.source.fetch().await {
            Ok(reach) => {
                self.initialized.store(true, Ordering::SeqCst);
                self.update(reach);
            }
            Err(err) => warn!(error = %err, "Failed to fetch reachability"),
        }
    }
}

/// Watches a [`ReachabilitySource`] and reports [`ConnectivityStatus`]
/// changes.
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
    cancellation: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(
        source: Arc<dyn ReachabilitySource>,
        quality: Arc<dyn ConnectionQualityProbe>,
        config: &ConnectivityConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                source,
                quality,
                debounce: config.debounce(),
                last: Mutex::new(None),
                initialized: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                callback: Mutex::new(None),
            }),
            cancellation: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the source and establish a baseline. `callback` receives
    /// every reported change.
    #[instrument(skip(self, callback))]
    pub fn start(&self, callback: ConnectivityCallback) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Err(OutpostError::InvalidInput("connectivity monitor already running".into()));
        }

        *self.inner.callback.lock() = Some(callback);
        *self.inner.last.lock() = None;
        self.inner.initialized.store(false, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        *self.cancellation.lock() = cancel.clone();

        // Subscribe before the baseline fetch so no change slips between them.
        let events = self.inner.source.subscribe();
        tasks.push(tokio::spawn(Self::event_loop(Arc::clone(&self.inner), events, cancel.clone())));
        tasks.push(tokio::spawn(Self::establish_baseline(Arc::clone(&self.inner), cancel)));

        info!("Connectivity monitor started");
        Ok(())
    }

    /// Feed a raw reachability value. Returns whether it changed the
    /// reported signal.
    pub fn update(&self, reach: Reachability) -> bool {
        self.inner.initialized.store(true, Ordering::SeqCst);
        self.inner.update(reach)
    }

    /// Last raw reachability seen, if any.
    pub fn current(&self) -> Option<Reachability> {
        self.inner.last.lock().map(|(reach, _)| reach)
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return Err(OutpostError::InvalidInput("connectivity monitor not running".into()));
        }

        self.cancellation.lock().cancel();
        // Pending reports must not fire after stop.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.callback.lock() = None;

        for handle in tasks {
            match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Connectivity monitor task panicked: {}", e),
                Err(_) => warn!("Connectivity monitor task did not complete within timeout"),
            }
        }

        info!("Connectivity monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    async fn establish_baseline(inner: Arc<MonitorInner>, cancel: CancellationToken) {
        let fetched = tokio::select! {
            () = cancel.cancelled() => return,
            fetched = inner.source.fetch() => fetched,
        };

        match fetched {
            Ok(reach) => {
                if inner.initialized.swap(true, Ordering::SeqCst) {
                    debug!("Live reachability arrived first; skipping baseline");
                } else {
                    inner.update(reach);
                }
            }
            Err(err) => warn!(error = %err, "Baseline reachability fetch failed"),
        }
    }

    async fn event_loop(
        inner: Arc<MonitorInner>,
        mut events: Receiver<ConnectivityEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(ConnectivityEvent::ReachabilityChanged(reach)) => {
                    inner.initialized.store(true, Ordering::SeqCst);
                    inner.update(reach);
                }
                Ok(ConnectivityEvent::AppStateChanged(AppState::Active)) => {
                    debug!("App returned to foreground; refreshing reachability");
                    inner.refresh().await;
                }
                Ok(ConnectivityEvent::AppStateChanged(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Reachability events lagged; refreshing");
                    inner.refresh().await;
                }
                Err(RecvError::Closed) => {
                    debug!("Reachability source closed");
                    break;
                }
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ConnectivityMonitor dropped while running; cancelling tasks");
            self.cancellation.lock().cancel();
        }
    }
}
