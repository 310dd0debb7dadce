//! Round-trip latency via the overlay's echo probe.

use std::net::IpAddr;

use thiserror::Error;

use super::PING_TIMEOUT;
use crate::overlay::{Overlay, OverlayError, PingResult};

#[derive(Debug, Error)]
pub enum LatencyError {
    /// The probe itself could not be carried out.
    #[error("ping failed: {0}")]
    Transport(#[source] OverlayError),

    /// The probe ran but the peer or daemon reported an error.
    #[error("ping error: {0}")]
    Peer(String),
}

/// Milliseconds from a completed ping, or the error it reported.
pub fn latency_ms(pr: &PingResult) -> Result<f64, LatencyError> {
    match &pr.err {
        Some(e) => Err(LatencyError::Peer(e.clone())),
        None => Ok(pr.latency_ms()),
    }
}

/// One bounded echo probe to `addr`, in milliseconds.
pub async fn measure_latency(overlay: &dyn Overlay, addr: IpAddr) -> Result<f64, LatencyError> {
    let pr = overlay
        .ping(addr, PING_TIMEOUT)
        .await
        .map_err(LatencyError::Transport)?;
    latency_ms(&pr)
}
