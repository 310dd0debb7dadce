//! Test server: the passive side of the tailperf protocol.
//!
//! Binds the well-known test port and hands every accepted stream to its own
//! task. Each task reads the one-byte handshake under a deadline and, for a
//! throughput request, streams random data until the client goes away.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::overlay::Overlay;
use crate::throughput::{stream_random, SendOutcome};
use crate::wire::TestKind;

/// How long a new connection has to send its handshake byte.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// How a single accepted connection ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionOutcome {
    /// No handshake byte arrived in time, or the stream closed first.
    HandshakeFailed,
    /// The handshake byte named no known test; the stream was dropped.
    UnknownTestKind(u8),
    Throughput(SendOutcome),
}

/// Bind the test listener described by `config`.
pub async fn bind(config: &NetworkConfig) -> Result<TcpListener> {
    let bind_addr = format!("{}:{}", config.listen_address, config.port);
    TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to listen on {}", bind_addr))
}

/// Server mode: log the local node if the overlay answers, then serve.
pub async fn run(
    config: &NetworkConfig,
    overlay: &dyn Overlay,
    cancel: CancellationToken,
) -> Result<()> {
    match overlay.status().await {
        Ok(status) => info!(node = %status.self_name(), "Starting tailperf server"),
        Err(e) => debug!(error = %e, "overlay status unavailable, serving anyway"),
    }

    let listener = bind(config).await?;
    serve(listener, cancel).await
}

/// Accept loop. Returns once `cancel` fires.
pub async fn serve(listener: TcpListener, cancel: CancellationToken) -> Result<()> {
    let local = listener.local_addr().context("failed to read listener address")?;
    info!(addr = %local, "Server listening");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Server shutting down");
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Accept error");
                        continue;
                    }
                };

                let cancel = cancel.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, &cancel).await;
                });
            }
        }
    }
}

/// Serve one connection to completion.
pub async fn handle_connection<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    cancel: &CancellationToken,
) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = conn_id.as_str(), peer_addr = %peer_addr, "New connection");

    let mut kind = [0u8; 1];
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.read_exact(&mut kind)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            warn!(conn_id = conn_id.as_str(), peer_addr = %peer_addr, error = %e, "Failed to read test type");
            return ConnectionOutcome::HandshakeFailed;
        }
        Err(_) => {
            warn!(conn_id = conn_id.as_str(), peer_addr = %peer_addr, "Timed out waiting for test type");
            return ConnectionOutcome::HandshakeFailed;
        }
    }

    match TestKind::from_byte(kind[0]) {
        Some(TestKind::Throughput) => {
            let outcome = stream_random(&mut stream, cancel).await;
            log_throughput(&conn_id, peer_addr, &outcome);
            ConnectionOutcome::Throughput(outcome)
        }
        None => {
            // No rejection is sent; the client just sees the stream close.
            warn!(
                conn_id = conn_id.as_str(),
                peer_addr = %peer_addr,
                test_type = kind[0],
                "Unknown test type"
            );
            ConnectionOutcome::UnknownTestKind(kind[0])
        }
    }
}

fn log_throughput(conn_id: &str, peer_addr: SocketAddr, outcome: &SendOutcome) {
    match *outcome {
        SendOutcome::PeerClosed {
            bytes_sent,
            duration_sec,
        } => {
            if let Some(mbps) = outcome.mbps() {
                info!(
                    conn_id,
                    peer_addr = %peer_addr,
                    bytes_sent,
                    duration_sec,
                    mbps,
                    "Throughput test completed"
                );
            }
        }
        SendOutcome::Cancelled { bytes_sent, .. } => {
            debug!(conn_id, peer_addr = %peer_addr, bytes_sent, "Throughput test cancelled");
        }
    }
}
