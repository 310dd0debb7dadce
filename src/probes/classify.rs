//! Connection classification.
//!
//! The status snapshot decides the baseline with fixed precedence
//! (direct, then peer relay, then DERP, then unknown). A bounded ping may
//! then refine it: a pong over a direct endpoint or through a DERP region
//! overrides the baseline, anything else leaves it alone.

use std::net::IpAddr;

use tracing::debug;

use super::{ConnectionType, PING_TIMEOUT};
use crate::overlay::{Overlay, OverlayError, PeerStatus, PingResult};

/// Connection type plus a human-readable description of the path.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub connection_type: ConnectionType,
    pub descriptor: String,
}

impl Classification {
    fn new(connection_type: ConnectionType, descriptor: String) -> Self {
        Self {
            connection_type,
            descriptor,
        }
    }
}

/// Classify from the snapshot alone.
pub fn connection_type(peer: &PeerStatus) -> Classification {
    if !peer.cur_addr.is_empty() {
        return Classification::new(
            ConnectionType::Direct,
            format!("direct to {}", peer.cur_addr),
        );
    }
    if !peer.peer_relay.is_empty() {
        return Classification::new(
            ConnectionType::PeerRelay,
            format!("peer-relay via {}", peer.peer_relay),
        );
    }
    if !peer.relay.is_empty() {
        return Classification::new(ConnectionType::DerpRelay, format!("derp-{}", peer.relay));
    }
    Classification::new(ConnectionType::Unknown, "unknown".to_string())
}

/// Apply a successful ping on top of the snapshot classification.
pub fn refine(base: Classification, ping: &PingResult) -> Classification {
    if ping.err.is_some() {
        return base;
    }
    let rtt_ms = ping.latency_ms();
    if let Some(endpoint) = ping.endpoint.as_deref().filter(|e| !e.is_empty()) {
        return Classification::new(
            ConnectionType::Direct,
            format!("direct to {} ({:.2}ms)", endpoint, rtt_ms),
        );
    }
    if let Some(region) = ping.derp_region_code.as_deref().filter(|r| !r.is_empty()) {
        return Classification::new(
            ConnectionType::DerpRelay,
            format!("derp-{} ({:.2}ms)", region, rtt_ms),
        );
    }
    base
}

/// Classify the peer at `addr` using a fresh snapshot and a refining ping.
pub async fn classify(overlay: &dyn Overlay, addr: IpAddr) -> Result<Classification, OverlayError> {
    let status = overlay.status().await?;
    let peer = status.find_peer(addr).ok_or(OverlayError::PeerNotFound(addr))?;
    let base = connection_type(peer);

    match overlay.ping(addr, PING_TIMEOUT).await {
        Ok(pr) => Ok(refine(base, &pr)),
        Err(e) => {
            debug!(peer = %addr, error = %e, "refining ping failed, keeping status classification");
            Ok(base)
        }
    }
}
