//! Connectivity monitoring

pub mod monitor;
pub mod ports;

pub use monitor::ConnectivityMonitor;
pub use ports::{ConnectionQualityProbe, ConnectivityCallback, ConnectivityEvent, ReachabilitySource};
