//! Connection-quality probes.

use async_trait::async_trait;
use outpost_core::ConnectionQualityProbe;
use outpost_domain::{OutpostError, Result};

/// For platforms that cannot tell whether a link is metered. The monitor
/// reports `is_connection_expensive: None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedQualityProbe;

#[async_trait]
impl ConnectionQualityProbe for UnsupportedQualityProbe {
    async fn is_connection_expensive(&self) -> Result<bool> {
        Err(OutpostError::Internal("connection quality is not available on this platform".into()))
    }
}

/// Fixed answer, for hosts that learn the metering state out of band.
#[derive(Debug, Clone, Copy)]
pub struct StaticQualityProbe(pub bool);

#[async_trait]
impl ConnectionQualityProbe for StaticQualityProbe {
    async fn is_connection_expensive(&self) -> Result<bool> {
        Ok(self.0)
    }
}
