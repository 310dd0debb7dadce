//! tailperf -- periodic latency and throughput probing across a Tailscale tailnet.
//!
//! Every node can run a test server that streams random data on request, and
//! a client that, on a fixed interval, classifies each matching peer's path,
//! pings it over the overlay, measures TCP throughput against its test
//! server, and prints a report.

pub mod config;
pub mod overlay;
pub mod probes;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod throughput;
pub mod wire;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::overlay::TailscaleCli;

/// Run the test server until `cancel` fires.
pub async fn serve(config: &Config, cancel: CancellationToken) -> Result<()> {
    let overlay = TailscaleCli::from_config(&config.overlay);
    tracing::info!(
        listen = %config.network.listen_address,
        port = config.network.port,
        "Starting tailperf test server"
    );
    server::run(&config.network, &overlay, cancel).await
}

/// Run the probing client until `cancel` fires.
pub async fn run_client(config: &Config, cancel: CancellationToken) -> Result<()> {
    let overlay = TailscaleCli::from_config(&config.overlay);
    scheduler::run_client(&overlay, config, cancel).await
}
