//! Port interfaces for reachability reporting

use std::sync::Arc;

use async_trait::async_trait;
use outpost_domain::{AppState, ConnectivityStatus, Reachability, Result};
use tokio::sync::broadcast;

/// Receives every connectivity change the monitor reports.
pub type ConnectivityCallback = Arc<dyn Fn(ConnectivityStatus) + Send + Sync>;

/// Live events published by a reachability source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// Platform reported a new raw reachability.
    ReachabilityChanged(Reachability),
    /// The hosting application moved to or from the foreground.
    AppStateChanged(AppState),
}

/// Platform reachability API: fetch the current value, subscribe to changes.
#[async_trait]
pub trait ReachabilitySource: Send + Sync {
    /// Current raw reachability.
    async fn fetch(&self) -> Result<Reachability>;

    /// Stream of live events. Each call returns a fresh receiver.
    fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent>;
}

/// Optional connection-quality metadata.
#[async_trait]
pub trait ConnectionQualityProbe: Send + Sync {
    /// Whether the current connection is metered. Platforms that cannot tell
    /// return an error.
    async fn is_connection_expensive(&self) -> Result<bool>;
}
