//! Platform reachability adapters

pub mod quality;
pub mod reachability;

pub use quality::{StaticQualityProbe, UnsupportedQualityProbe};
pub use reachability::{ChannelReachabilitySource, HttpReachabilityProbe};
