//! One probing round: select peers, test each, collect results.

use std::net::IpAddr;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::Config;
use crate::overlay::{Overlay, OverlayError};
use crate::probes::{self, Classification, ProbeError, SelectedPeer};
use crate::throughput;

/// Measurements from a peer that passed every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMetrics {
    pub connection: Classification,
    pub latency_ms: f64,
    pub throughput_mbps: f64,
}

/// Result of testing one peer in one round.
///
/// Either every metric is present or exactly one stage failure is recorded.
#[derive(Debug)]
pub struct TestResult {
    pub peer_name: String,
    pub peer_addr: IpAddr,
    pub timestamp: DateTime<Local>,
    pub outcome: Result<PeerMetrics, ProbeError>,
}

impl TestResult {
    pub fn metrics(&self) -> Option<&PeerMetrics> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ProbeError> {
        self.outcome.as_ref().err()
    }

    /// Latency in ms; zero for a failed test.
    pub fn latency_ms(&self) -> f64 {
        self.metrics().map_or(0.0, |m| m.latency_ms)
    }

    /// Throughput in Mbps; zero for a failed test.
    pub fn throughput_mbps(&self) -> f64 {
        self.metrics().map_or(0.0, |m| m.throughput_mbps)
    }
}

/// What a round produced.
#[derive(Debug)]
pub enum RoundOutcome {
    /// The membership snapshot could not be fetched; nothing was tested.
    StatusUnavailable(OverlayError),
    /// No online peer matched the selection.
    NoPeers,
    Completed(Vec<TestResult>),
}

/// Run one round against the peers currently visible in `overlay`.
///
/// Peers are tested one after another; a failure only ends that peer's
/// tests.
pub async fn run_round(overlay: &dyn Overlay, config: &Config) -> RoundOutcome {
    let status = match overlay.status().await {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, "Failed to get status");
            return RoundOutcome::StatusUnavailable(e);
        }
    };

    let peers = probes::select_peers(&status, config.client.target(), config.client.filter());
    if peers.is_empty() {
        info!("No online peers found");
        return RoundOutcome::NoPeers;
    }

    info!(count = peers.len(), "Found online peer(s), starting tests");

    let mut results = Vec::with_capacity(peers.len());
    for peer in &peers {
        results.push(test_peer(overlay, peer, config).await);
    }

    RoundOutcome::Completed(results)
}

/// Classify, then measure latency, then throughput, stopping at the first failure.
pub async fn test_peer(overlay: &dyn Overlay, peer: &SelectedPeer, config: &Config) -> TestResult {
    let timestamp = Local::now();
    let outcome = probe_peer(overlay, peer, config).await;

    if let Err(e) = &outcome {
        warn!(peer = %peer.name, addr = %peer.addr, stage = ?e.stage(), error = %e, "peer test failed");
    }

    TestResult {
        peer_name: peer.name.clone(),
        peer_addr: peer.addr,
        timestamp,
        outcome,
    }
}

async fn probe_peer(
    overlay: &dyn Overlay,
    peer: &SelectedPeer,
    config: &Config,
) -> Result<PeerMetrics, ProbeError> {
    info!(peer = %peer.name, addr = %peer.addr, "Testing peer - getting connection info");
    let connection = probes::classify(overlay, peer.addr)
        .await
        .map_err(ProbeError::ConnectionInfo)?;
    info!(peer = %peer.name, connection_type = %connection.connection_type, "Connection type");

    let latency_ms = probes::measure_latency(overlay, peer.addr)
        .await
        .map_err(ProbeError::Latency)?;
    info!(peer = %peer.name, latency_ms, "Latency");

    let throughput_mbps =
        throughput::measure_peer(peer.addr, config.network.port, config.client.duration)
            .await
            .map_err(ProbeError::Throughput)?;
    info!(peer = %peer.name, throughput_mbps, "Throughput");

    Ok(PeerMetrics {
        connection,
        latency_ms,
        throughput_mbps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{OverlayStatus, PeerStatus, PingResult};
    use crate::probes::{ConnectionType, Stage};
    use std::time::Duration;

    /// Overlay whose pings always fail at the daemon.
    struct NoPongOverlay {
        status: OverlayStatus,
    }

    #[async_trait::async_trait]
    impl Overlay for NoPongOverlay {
        async fn status(&self) -> Result<OverlayStatus, OverlayError> {
            Ok(self.status.clone())
        }

        async fn ping(&self, _addr: IpAddr, _timeout: Duration) -> Result<PingResult, OverlayError> {
            Ok(PingResult {
                err: Some("no reply".into()),
                ..Default::default()
            })
        }
    }

    struct DownOverlay;

    #[async_trait::async_trait]
    impl Overlay for DownOverlay {
        async fn status(&self) -> Result<OverlayStatus, OverlayError> {
            Err(OverlayError::NotRunning("Stopped".into()))
        }

        async fn ping(&self, _addr: IpAddr, _timeout: Duration) -> Result<PingResult, OverlayError> {
            unreachable!("no ping without status")
        }
    }

    fn online(host: &str, ip: &str) -> PeerStatus {
        PeerStatus {
            host_name: host.into(),
            tailscale_ips: vec![ip.parse().unwrap()],
            online: true,
            relay: "nyc".into(),
            ..Default::default()
        }
    }

    fn overlay_with(peers: Vec<PeerStatus>) -> NoPongOverlay {
        let mut status = OverlayStatus {
            backend_state: "Running".into(),
            ..Default::default()
        };
        for (i, p) in peers.into_iter().enumerate() {
            status.peer.insert(format!("nodekey:{i}"), p);
        }
        NoPongOverlay { status }
    }

    fn config_all() -> Config {
        let mut config = Config::default();
        config.client.filter.clear();
        config
    }

    #[tokio::test]
    async fn test_status_failure_skips_round() {
        let outcome = run_round(&DownOverlay, &config_all()).await;
        assert!(matches!(outcome, RoundOutcome::StatusUnavailable(_)));
    }

    #[tokio::test]
    async fn test_no_matching_peers() {
        let overlay = overlay_with(vec![online("laptop", "100.64.0.2")]);
        let outcome = run_round(&overlay, &Config::default()).await;
        assert!(matches!(outcome, RoundOutcome::NoPeers));
    }

    #[tokio::test]
    async fn test_latency_failure_short_circuits_and_isolates() {
        let overlay = overlay_with(vec![
            online("alpha", "100.64.0.2"),
            online("beta", "100.64.0.3"),
        ]);

        let RoundOutcome::Completed(results) = run_round(&overlay, &config_all()).await else {
            panic!("round should complete");
        };
        assert_eq!(results.len(), 2);

        for r in &results {
            let err = r.error().expect("latency should fail");
            assert_eq!(err.stage(), Stage::Latency);
            assert!(err.to_string().starts_with("latency: ping error: no reply"));
            assert_eq!(r.latency_ms(), 0.0);
            assert_eq!(r.throughput_mbps(), 0.0);
            assert!(r.metrics().is_none());
        }
    }

    #[tokio::test]
    async fn test_peer_missing_from_fresh_snapshot() {
        let overlay = overlay_with(vec![]);
        let peer = SelectedPeer {
            name: "ghost".into(),
            addr: "100.64.0.99".parse().unwrap(),
        };

        let result = test_peer(&overlay, &peer, &config_all()).await;
        let err = result.error().expect("classification should fail");
        assert_eq!(err.stage(), Stage::Classification);
        assert!(err.to_string().starts_with("connection info: peer 100.64.0.99 not found"));
    }

    #[test]
    fn test_success_accessors() {
        let result = TestResult {
            peer_name: "test-peer".into(),
            peer_addr: "100.64.0.1".parse().unwrap(),
            timestamp: Local::now(),
            outcome: Ok(PeerMetrics {
                connection: Classification {
                    connection_type: ConnectionType::Direct,
                    descriptor: "direct to 192.168.1.1:41641".into(),
                },
                latency_ms: 5.5,
                throughput_mbps: 1000.0,
            }),
        };

        assert!(result.error().is_none());
        assert_eq!(result.latency_ms(), 5.5);
        assert_eq!(result.throughput_mbps(), 1000.0);
        assert_eq!(
            result.metrics().unwrap().connection.connection_type,
            ConnectionType::Direct
        );
    }
}
