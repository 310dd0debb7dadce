//! Throughput testing engine.
//!
//! Both roles of the throughput sub-protocol live here so the client and the
//! test server share one implementation: [`client`] dials a peer and counts
//! received bytes for a fixed window, [`sender`] streams random chunks until
//! the peer stops reading.

pub mod client;
pub mod sender;

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub use client::{measure_peer, run_throughput};
pub use sender::{stream_random, SendOutcome};

/// Safety margin added to the test duration for the overall connection deadline.
pub const DEADLINE_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("failed to dial peer {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out dialing peer {addr}")]
    DialTimeout { addr: SocketAddr },

    #[error("failed to send test type: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("test duration too short")]
    ZeroElapsed,
}

impl ThroughputError {
    /// Whether the failure happened before a stream was established.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ThroughputError::Dial { .. } | ThroughputError::DialTimeout { .. }
        )
    }
}

/// Bytes received over a measured window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ThroughputSample {
    pub fn mbps(&self) -> Result<f64, ThroughputError> {
        compute_mbps(self.bytes, self.elapsed)
    }
}

/// Megabits per second for `bytes` received over `elapsed`.
///
/// A zero-length window is an error rather than an infinite rate.
pub fn compute_mbps(bytes: u64, elapsed: Duration) -> Result<f64, ThroughputError> {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return Err(ThroughputError::ZeroElapsed);
    }
    Ok(bytes as f64 * 8.0 / secs / 1e6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_megabytes_in_one_second_is_80_mbps() {
        let mbps = compute_mbps(10_000_000, Duration::from_millis(1000)).unwrap();
        assert!((mbps - 80.0).abs() < 1e-9, "got {}", mbps);
    }

    #[test]
    fn test_zero_elapsed_is_an_error() {
        let err = compute_mbps(1_000_000, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ThroughputError::ZeroElapsed));
        assert_eq!(err.to_string(), "test duration too short");
    }

    #[test]
    fn test_zero_bytes_is_zero_mbps() {
        let sample = ThroughputSample {
            bytes: 0,
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(sample.mbps().unwrap(), 0.0);
    }

    #[test]
    fn test_connectivity_classification() {
        let addr: SocketAddr = "100.64.0.2:9898".parse().unwrap();
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(ThroughputError::Dial { addr, source: refused }.is_connectivity());
        assert!(ThroughputError::DialTimeout { addr }.is_connectivity());
        assert!(!ThroughputError::ZeroElapsed.is_connectivity());
    }
}
