//! Per-peer probes: connection classification, latency, and peer selection.

pub mod classify;
pub mod latency;
pub mod select;

use std::time::Duration;

use thiserror::Error;

use crate::overlay::OverlayError;
use crate::throughput::ThroughputError;

pub use classify::{classify, connection_type, Classification};
pub use latency::{measure_latency, LatencyError};
pub use select::{select_peers, SelectedPeer};

/// Bound on every echo probe.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// How traffic to a peer is currently carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Direct,
    DerpRelay,
    PeerRelay,
    Unknown,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::Direct => write!(f, "direct"),
            ConnectionType::DerpRelay => write!(f, "derp"),
            ConnectionType::PeerRelay => write!(f, "peer-relay"),
            ConnectionType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which part of a peer test failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classification,
    Latency,
    Throughput,
    /// The throughput stream could not be established.
    Connectivity,
}

/// A per-peer failure, tagged with the stage that produced it.
///
/// The display form starts with the stage prefix shown in reports.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection info: {0}")]
    ConnectionInfo(#[source] OverlayError),

    #[error("latency: {0}")]
    Latency(#[source] LatencyError),

    #[error("throughput: {0}")]
    Throughput(#[source] ThroughputError),
}

impl ProbeError {
    pub fn stage(&self) -> Stage {
        match self {
            ProbeError::ConnectionInfo(_) => Stage::Classification,
            ProbeError::Latency(_) => Stage::Latency,
            ProbeError::Throughput(e) if e.is_connectivity() => Stage::Connectivity,
            ProbeError::Throughput(_) => Stage::Throughput,
        }
    }
}
