//! Reachability sources.
//!
//! [`ChannelReachabilitySource`] is fed by platform glue (mobile bridges,
//! desktop network notifications). [`HttpReachabilityProbe`] derives
//! reachability from whether a probe URL answers at all.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use outpost_core::{ConnectivityEvent, ReachabilitySource};
use outpost_domain::{AppState, ConnectivityConfig, OutpostError, Reachability, Result};
use parking_lot::{Mutex, RwLock};
use reqwest::Client as ReqwestClient;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::InfraError;

const EVENT_CAPACITY: usize = 64;
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Source whose state is pushed in from outside.
pub struct ChannelReachabilitySource {
    current: RwLock<Reachability>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ChannelReachabilitySource {
    pub fn new(initial: Reachability) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { current: RwLock::new(initial), events }
    }

    /// Record a platform reachability report and publish it.
    pub fn set_reachability(&self, reach: Reachability) {
        *self.current.write() = reach;
        // No subscribers is fine; the value is still served by `fetch`.
        let _ = self.events.send(ConnectivityEvent::ReachabilityChanged(reach));
    }

    /// Publish a foreground/background transition.
    pub fn set_app_state(&self, state: AppState) {
        let _ = self.events.send(ConnectivityEvent::AppStateChanged(state));
    }
}

impl Default for ChannelReachabilitySource {
    fn default() -> Self {
        Self::new(Reachability::Unknown)
    }
}

#[async_trait]
impl ReachabilitySource for ChannelReachabilitySource {
    async fn fetch(&self) -> Result<Reachability> {
        Ok(*self.current.read())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }
}

struct ProbeInner {
    client: ReqwestClient,
    url: String,
    current: RwLock<Reachability>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ProbeInner {
    async fn probe(&self) -> Reachability {
        let reach = match self.client.head(&self.url).send().await {
            // Any answer, even an error status, means the network is up.
            Ok(_) => Reachability::Other,
            Err(err) => {
                debug!(url = %self.url, error = %err, "Reachability probe failed");
                Reachability::None
            }
        };

        let changed = {
            let mut current = self.current.write();
            let changed = *current != reach;
            *current = reach;
            changed
        };
        if changed {
            let _ = self.events.send(ConnectivityEvent::ReachabilityChanged(reach));
        }
        reach
    }
}

/// Source that polls an HTTP endpoint.
pub struct HttpReachabilityProbe {
    inner: Arc<ProbeInner>,
    poll_interval: Duration,
    polling: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl HttpReachabilityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration, poll_interval: Duration) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|err| OutpostError::from(InfraError::from(err)))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(ProbeInner {
                client,
                url: url.into(),
                current: RwLock::new(Reachability::Unknown),
                events,
            }),
            poll_interval,
            polling: Mutex::new(None),
        })
    }

    /// Probe built from the `connectivity` config section, if it names a URL.
    pub fn from_config(config: &ConnectivityConfig) -> Result<Option<Self>> {
        config
            .probe_url
            .as_deref()
            .map(|url| Self::new(url, config.probe_timeout(), config.poll_interval()))
            .transpose()
    }

    /// Last probed value without probing again.
    pub fn last_known(&self) -> Reachability {
        *self.inner.current.read()
    }

    /// Probe on a fixed interval, publishing changes to subscribers.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub fn start_polling(&self) -> Result<()> {
        let mut polling = self.polling.lock();
        if polling.is_some() {
            return Err(OutpostError::InvalidInput("reachability polling already running".into()));
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(&self.inner);
        let interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.probe().await;
                    }
                }
            }
            debug!("Reachability polling loop exited");
        });

        *polling = Some((token, handle));
        info!(interval_secs = interval.as_secs(), "Reachability polling started");
        Ok(())
    }

    pub async fn stop_polling(&self) -> Result<()> {
        let Some((token, handle)) = self.polling.lock().take() else {
            return Err(OutpostError::InvalidInput("reachability polling not running".into()));
        };

        token.cancel();
        match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
            Ok(Ok(())) => {
                info!("Reachability polling stopped");
                Ok(())
            }
            Ok(Err(err)) => Err(OutpostError::Internal(format!("polling task failed: {err}"))),
            Err(_) => Err(OutpostError::Internal("timed out stopping reachability polling".into())),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling.lock().is_some()
    }
}

impl Drop for HttpReachabilityProbe {
    fn drop(&mut self) {
        if let Some((token, _)) = self.polling.lock().take() {
            warn!("HttpReachabilityProbe dropped while polling; cancelling");
            token.cancel();
        }
    }
}

#[async_trait]
impl ReachabilitySource for HttpReachabilityProbe {
    async fn fetch(&self) -> Result<Reachability> {
        Ok(self.inner.probe().await)
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.inner.events.subscribe()
    }
}
