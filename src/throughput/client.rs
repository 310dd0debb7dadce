//! Initiator side of the throughput test.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use super::{ThroughputError, ThroughputSample, DEADLINE_SLACK};
use crate::wire::{TestKind, CHUNK_SIZE};

/// Dial `addr:port`, run a throughput test for `duration` and return Mbps.
///
/// Dialing, the handshake and the read window all share one deadline of
/// `duration + DEADLINE_SLACK` from the moment the dial starts.
pub async fn measure_peer(
    addr: IpAddr,
    port: u16,
    duration: Duration,
) -> Result<f64, ThroughputError> {
    let target = SocketAddr::new(addr, port);
    let deadline = Instant::now() + duration + DEADLINE_SLACK;

    let stream = match tokio::time::timeout_at(deadline, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(ThroughputError::Dial { addr: target, source }),
        Err(_) => return Err(ThroughputError::DialTimeout { addr: target }),
    };
    debug!(peer = %target, "connected for throughput test");

    let sample = run_throughput(stream, duration, deadline).await?;
    debug!(
        peer = %target,
        bytes = sample.bytes,
        elapsed_sec = sample.elapsed.as_secs_f64(),
        "throughput window closed"
    );
    sample.mbps()
}

/// Send the throughput handshake on `stream` and count bytes received.
///
/// Reading stops normally when the window of `duration` has elapsed, when a
/// read is cut short by that window or by `deadline`, or on end of stream.
/// Any other read error fails the test.
pub async fn run_throughput<S>(
    mut stream: S,
    duration: Duration,
    deadline: Instant,
) -> Result<ThroughputSample, ThroughputError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[TestKind::Throughput.as_byte()])
        .await
        .map_err(ThroughputError::Handshake)?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    let start = Instant::now();
    let stop_at = start + duration;
    let read_deadline = stop_at.min(deadline);

    while Instant::now() < stop_at {
        match tokio::time::timeout_at(read_deadline, stream.read(&mut buf)).await {
            // The window closed mid-read.
            Err(_) => break,
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total += n as u64,
            Ok(Err(e)) => return Err(ThroughputError::Read(e)),
        }
    }

    Ok(ThroughputSample {
        bytes: total,
        elapsed: start.elapsed(),
    })
}
