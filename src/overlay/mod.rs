//! Boundary to the overlay network runtime (Tailscale).
//!
//! The probe engine only needs two capabilities from the overlay: a
//! membership snapshot and a best-effort echo probe. Both are expressed by
//! the [`Overlay`] trait so rounds can run against the real daemon
//! ([`cli::TailscaleCli`]) or an in-memory fake in tests.

pub mod cli;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub use cli::TailscaleCli;

/// Backend state reported by a healthy, logged-in node.
pub const BACKEND_RUNNING: &str = "Running";

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with code {code:?}: {stderr}")]
    Exited {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to decode status: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("peer {0} not found in status")]
    PeerNotFound(IpAddr),

    #[error("Tailscale is not in Running state (current: {0})")]
    NotRunning(String),
}

/// Membership snapshot, shaped after `tailscale status --json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OverlayStatus {
    #[serde(default)]
    pub backend_state: String,
    #[serde(rename = "Self", default)]
    pub self_node: Option<PeerStatus>,
    /// Peers keyed by node key.
    #[serde(default, deserialize_with = "null_as_default")]
    pub peer: BTreeMap<String, PeerStatus>,
}

impl OverlayStatus {
    /// Fail unless the backend is up and logged in.
    pub fn ensure_running(&self) -> Result<(), OverlayError> {
        if self.backend_state == BACKEND_RUNNING {
            Ok(())
        } else {
            Err(OverlayError::NotRunning(self.backend_state.clone()))
        }
    }

    /// Display name of the local node, or `"unknown"`.
    pub fn self_name(&self) -> &str {
        self.self_node
            .as_ref()
            .map(PeerStatus::display_name)
            .unwrap_or("unknown")
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerStatus> {
        self.peer.values()
    }

    /// Locate the peer advertising `addr` among its overlay addresses.
    pub fn find_peer(&self, addr: IpAddr) -> Option<&PeerStatus> {
        self.peers().find(|ps| ps.tailscale_ips.contains(&addr))
    }
}

/// One node's entry in the membership snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerStatus {
    #[serde(default)]
    pub host_name: String,
    #[serde(rename = "DNSName", default)]
    pub dns_name: String,
    #[serde(rename = "TailscaleIPs", default, deserialize_with = "null_as_default")]
    pub tailscale_ips: Vec<IpAddr>,
    #[serde(default)]
    pub online: bool,
    /// Current direct UDP path, empty when relayed.
    #[serde(default)]
    pub cur_addr: String,
    /// DERP region the peer is reached through, if any.
    #[serde(default)]
    pub relay: String,
    /// Peer relay endpoint, if traffic is tunnelled through another node.
    #[serde(default)]
    pub peer_relay: String,
}

impl PeerStatus {
    /// Fully-qualified name when known, short host name otherwise.
    pub fn display_name(&self) -> &str {
        if self.dns_name.is_empty() {
            &self.host_name
        } else {
            &self.dns_name
        }
    }
}

/// Outcome of a single echo probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingResult {
    pub latency_seconds: f64,
    /// Error reported by the peer or daemon, distinct from a transport failure.
    pub err: Option<String>,
    /// Direct endpoint the pong arrived on.
    pub endpoint: Option<String>,
    /// DERP region code the pong was relayed through.
    pub derp_region_code: Option<String>,
}

impl PingResult {
    pub fn latency_ms(&self) -> f64 {
        self.latency_seconds * 1000.0
    }
}

/// Capabilities consumed from the overlay runtime.
#[async_trait::async_trait]
pub trait Overlay: Send + Sync {
    /// Current membership snapshot.
    async fn status(&self) -> Result<OverlayStatus, OverlayError>;

    /// Send one echo probe to `addr`, giving up after `timeout`.
    async fn ping(&self, addr: IpAddr, timeout: Duration) -> Result<PingResult, OverlayError>;
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_status() -> &'static str {
        r#"
        {
          "Version": "1.80.0",
          "BackendState": "Running",
          "Self": {
            "HostName": "laptop",
            "DNSName": "laptop.tail1234.ts.net.",
            "TailscaleIPs": ["100.64.0.1", "fd7a:115c:a1e0::1"],
            "Online": true
          },
          "Peer": {
            "nodekey:aaaa": {
              "HostName": "tailperf-server",
              "DNSName": "tailperf-server.tail1234.ts.net.",
              "TailscaleIPs": ["100.64.0.2"],
              "Online": true,
              "CurAddr": "192.168.1.20:41641",
              "Relay": "nyc"
            },
            "nodekey:bbbb": {
              "HostName": "phone",
              "DNSName": "",
              "TailscaleIPs": null,
              "Online": false,
              "CurAddr": "",
              "Relay": ""
            }
          }
        }
        "#
    }

    #[test]
    fn test_parse_status_json() {
        let status: OverlayStatus = serde_json::from_str(fixture_status()).unwrap();

        assert!(status.ensure_running().is_ok());
        assert_eq!(status.self_name(), "laptop.tail1234.ts.net.");
        assert_eq!(status.peer.len(), 2);

        let server = &status.peer["nodekey:aaaa"];
        assert_eq!(server.host_name, "tailperf-server");
        assert_eq!(server.cur_addr, "192.168.1.20:41641");
        assert_eq!(server.relay, "nyc");
        assert!(server.peer_relay.is_empty());

        let phone = &status.peer["nodekey:bbbb"];
        assert!(phone.tailscale_ips.is_empty());
        assert_eq!(phone.display_name(), "phone");
    }

    #[test]
    fn test_find_peer_by_any_address() {
        let status: OverlayStatus = serde_json::from_str(fixture_status()).unwrap();
        let addr: IpAddr = "100.64.0.2".parse().unwrap();
        let found = status.find_peer(addr).expect("peer should be found");
        assert_eq!(found.host_name, "tailperf-server");

        let missing: IpAddr = "100.64.0.99".parse().unwrap();
        assert!(status.find_peer(missing).is_none());
    }

    #[test]
    fn test_not_running_is_an_error() {
        let status: OverlayStatus =
            serde_json::from_str(r#"{"BackendState": "NeedsLogin", "Peer": null}"#).unwrap();
        let err = status.ensure_running().unwrap_err();
        assert!(err.to_string().contains("NeedsLogin"));
        assert_eq!(status.self_name(), "unknown");
        assert_eq!(status.peers().count(), 0);
    }

    #[test]
    fn test_ping_latency_ms() {
        let pr = PingResult {
            latency_seconds: 0.0125,
            ..Default::default()
        };
        assert!((pr.latency_ms() - 12.5).abs() < 1e-9);
    }
}
