use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tailperf::config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "tailperf",
    about = "Peer-to-peer latency and throughput monitor for Tailscale networks",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "TAILPERF_CONFIG")]
    config: Option<PathBuf>,

    /// tailscaled socket to talk to (defaults to the system daemon)
    #[arg(long, global = true, env = "TAILPERF_SOCKET")]
    socket: Option<PathBuf>,

    /// Path to the tailscale CLI
    #[arg(long, global = true)]
    tailscale: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test server that peers measure against
    Serve {
        /// Listen address
        #[arg(long)]
        listen: Option<String>,

        /// Test port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Periodically test every matching peer and print a report
    Client {
        /// Time between rounds (e.g. 30s, 5m)
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        /// Throughput window per peer (1s to 5m)
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Only test peers whose hostname contains this (empty tests all)
        #[arg(long, env = "TAILPERF_FILTER")]
        filter: Option<String>,

        /// Test only the peer with this hostname or DNS name
        #[arg(long, env = "TAILPERF_TARGET")]
        target: Option<String>,

        /// Test port peers listen on
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::info!("Shutting down...");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        config.overlay.socket = Some(socket);
    }
    if let Some(path) = cli.tailscale {
        config.overlay.tailscale_path = path;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.json = true;
    }

    match &cli.command {
        Commands::Serve { listen, port } => {
            if let Some(listen) = listen {
                config.network.listen_address = listen.clone();
            }
            if let Some(port) = port {
                config.network.port = *port;
            }
        }
        Commands::Client {
            interval,
            duration,
            filter,
            target,
            port,
        } => {
            if let Some(interval) = interval {
                config.client.interval = *interval;
            }
            if let Some(duration) = duration {
                config.client.duration = *duration;
            }
            if let Some(filter) = filter {
                config.client.filter = filter.clone();
            }
            if let Some(target) = target {
                config.client.target = target.clone();
            }
            if let Some(port) = port {
                config.network.port = *port;
            }
        }
    }

    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "Loaded configuration file");
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match cli.command {
        Commands::Serve { .. } => tailperf::serve(&config, cancel).await?,
        Commands::Client { .. } => tailperf::run_client(&config, cancel).await?,
    }

    Ok(())
}
