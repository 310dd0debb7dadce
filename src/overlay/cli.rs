//! [`Overlay`] implementation backed by the `tailscale` command-line client.
//!
//! Status comes from `tailscale status --json`. Echo probes use
//! `tailscale ping -c 1`, whose text output is parsed for the pong path and
//! round-trip time.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use super::{Overlay, OverlayError, OverlayStatus, PingResult};
use crate::config::OverlayConfig;

/// Upper bound on how long `tailscale status` may take.
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack given to the ping subprocess beyond its own `--timeout`.
const PING_GRACE: Duration = Duration::from_secs(2);

/// Drives a local `tailscaled` through its CLI.
#[derive(Debug, Clone)]
pub struct TailscaleCli {
    binary: String,
    socket: Option<PathBuf>,
}

impl TailscaleCli {
    /// `binary` is a path or a bare command resolved through `$PATH`.
    /// `socket` selects a non-default daemon, e.g. a dedicated userspace node.
    pub fn new(binary: impl Into<String>, socket: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(config.tailscale_path.clone(), config.socket.clone())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(socket) = &self.socket {
            cmd.arg(format!("--socket={}", socket.display()));
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(
        &self,
        mut cmd: Command,
        label: &str,
        timeout: Duration,
    ) -> Result<Output, OverlayError> {
        let command = format!("{} {}", self.binary, label);
        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(OverlayError::Spawn { command, source }),
            Err(_) => Err(OverlayError::Timeout { command, timeout }),
        }
    }
}

#[async_trait::async_trait]
impl Overlay for TailscaleCli {
    async fn status(&self) -> Result<OverlayStatus, OverlayError> {
        let mut cmd = self.command();
        cmd.args(["status", "--json"]);

        let output = self.run(cmd, "status", STATUS_TIMEOUT).await?;
        if !output.status.success() {
            return Err(OverlayError::Exited {
                command: format!("{} status", self.binary),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let status: OverlayStatus = serde_json::from_slice(&output.stdout)?;
        debug!(
            backend_state = %status.backend_state,
            peers = status.peer.len(),
            "fetched overlay status"
        );
        Ok(status)
    }

    async fn ping(&self, addr: IpAddr, timeout: Duration) -> Result<PingResult, OverlayError> {
        let mut cmd = self.command();
        cmd.arg("ping")
            .arg("--c")
            .arg("1")
            .arg("--until-direct=false")
            .arg("--timeout")
            .arg(format!("{}ms", timeout.as_millis()))
            .arg(addr.to_string());

        let output = self.run(cmd, "ping", timeout + PING_GRACE).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if let Some(pong) = parse_pong(&stdout) {
            return Ok(pong);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);

        // Nothing on stdout means the CLI never got as far as pinging, e.g.
        // the daemon is unreachable.
        if !output.status.success() && stdout.trim().is_empty() && !stderr.trim().is_empty() {
            return Err(OverlayError::Exited {
                command: format!("{} ping", self.binary),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        // The ping ran but got no usable pong: a peer-reported error.
        let message = [stderr.trim(), stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("no reply")
            .lines()
            .last()
            .unwrap_or("no reply")
            .to_string();
        warn!(peer = %addr, code = ?output.status.code(), %message, "ping produced no pong");

        Ok(PingResult {
            err: Some(message),
            ..Default::default()
        })
    }
}

/// Parse the first `pong from <name> (<ip>) via <path> in <rtt>` line.
///
/// `<path>` is either a direct `ip:port` endpoint, `DERP(<region>)`, or
/// `peer-relay(...)`. A peer-relay pong carries neither an endpoint nor a
/// region code.
pub fn parse_pong(output: &str) -> Option<PingResult> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("pong from "))?;

    let (head, rtt) = line.rsplit_once(" in ")?;
    let (_, via) = head.rsplit_once(" via ")?;
    let latency_seconds = parse_go_duration(rtt)?;

    let mut result = PingResult {
        latency_seconds,
        ..Default::default()
    };

    if let Some(region) = via.strip_prefix("DERP(").and_then(|r| r.strip_suffix(')')) {
        result.derp_region_code = Some(region.to_string());
    } else if !via.starts_with("peer-relay(") {
        result.endpoint = Some(via.to_string());
    }

    Some(result)
}

/// Parse a single-unit Go duration string such as `12ms`, `1.5s` or `850µs`.
fn parse_go_duration(s: &str) -> Option<f64> {
    let s = s.trim();
    let (value, scale) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1e-3)
    } else if let Some(v) = s.strip_suffix("µs").or_else(|| s.strip_suffix("us")) {
        (v, 1e-6)
    } else if let Some(v) = s.strip_suffix("ns") {
        (v, 1e-9)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1.0)
    } else {
        return None;
    };
    value.parse::<f64>().ok().map(|v| v * scale)
}
