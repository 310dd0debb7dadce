//! Responder side of the throughput test.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::compute_mbps;
use crate::wire::CHUNK_SIZE;

/// How a responder session ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SendOutcome {
    /// A write failed, normally because the initiator closed its side.
    PeerClosed { bytes_sent: u64, duration_sec: f64 },
    /// The process-wide shutdown signal fired.
    Cancelled { bytes_sent: u64, duration_sec: f64 },
}

impl SendOutcome {
    pub fn bytes_sent(&self) -> u64 {
        match *self {
            SendOutcome::PeerClosed { bytes_sent, .. } | SendOutcome::Cancelled { bytes_sent, .. } => {
                bytes_sent
            }
        }
    }

    /// Achieved rate, or `None` for a zero-length session.
    pub fn mbps(&self) -> Option<f64> {
        match *self {
            SendOutcome::PeerClosed {
                bytes_sent,
                duration_sec,
            }
            | SendOutcome::Cancelled {
                bytes_sent,
                duration_sec,
            } => compute_mbps(bytes_sent, std::time::Duration::from_secs_f64(duration_sec)).ok(),
        }
    }
}

/// Write freshly generated random chunks to `stream` until a write fails or
/// `cancel` fires. Never reads from the stream.
pub async fn stream_random<S>(stream: &mut S, cancel: &CancellationToken) -> SendOutcome
where
    S: AsyncWrite + Unpin,
{
    let mut rng = StdRng::from_entropy();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut bytes_sent: u64 = 0;
    let start = Instant::now();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // New content per chunk so the payload cannot be special-cased in transit.
        rng.fill_bytes(&mut chunk);

        let mut offset = 0;
        while offset < chunk.len() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return SendOutcome::Cancelled {
                        bytes_sent,
                        duration_sec: start.elapsed().as_secs_f64(),
                    };
                }

                written = stream.write(&chunk[offset..]) => match written {
                    Ok(n) if n > 0 => {
                        offset += n;
                        bytes_sent += n as u64;
                    }
                    _ => {
                        return SendOutcome::PeerClosed {
                            bytes_sent,
                            duration_sec: start.elapsed().as_secs_f64(),
                        };
                    }
                }
            }
        }
    }

    SendOutcome::Cancelled {
        bytes_sent,
        duration_sec: start.elapsed().as_secs_f64(),
    }
}
