//! TOML configuration for tailperf.
//!
//! A layered model: compiled-in defaults, then an optional TOML file (path
//! from `--config` or `TAILPERF_CONFIG`), then command-line overrides applied
//! by the binary. The resulting [`Config`] is validated once at startup and
//! passed by reference from then on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::wire::PERF_TEST_PORT;

/// Shortest allowed probe interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Shortest allowed per-peer throughput test.
pub const MIN_TEST_DURATION: Duration = Duration::from_secs(1);
/// Longest allowed per-peer throughput test.
pub const MAX_TEST_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("interval must be at least 1 second (got {0:?})")]
    IntervalTooShort(Duration),

    #[error("test duration must be at least 1 second (got {0:?})")]
    DurationTooShort(Duration),

    #[error("test duration cannot exceed 5 minutes (got {0:?})")]
    DurationTooLong(Duration),

    #[error("port must be non-zero")]
    InvalidPort,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for both the client and the test server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use compiled-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Check the bounds that must hold before anything starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.interval < MIN_INTERVAL {
            return Err(ConfigError::IntervalTooShort(self.client.interval));
        }
        if self.client.duration < MIN_TEST_DURATION {
            return Err(ConfigError::DurationTooShort(self.client.duration));
        }
        if self.client.duration > MAX_TEST_DURATION {
            return Err(ConfigError::DurationTooLong(self.client.duration));
        }
        if self.network.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        info!(
            interval = ?self.client.interval,
            duration = ?self.client.duration,
            port = self.network.port,
            "configuration validated"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Where the test server listens and which port clients dial.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the test server binds to.
    pub listen_address: String,
    /// Test protocol port, shared by server and client.
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: PERF_TEST_PORT,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Probe scheduling and peer selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time between the starts of consecutive rounds.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Wall-clock length of each throughput test.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Only test peers whose name contains this (empty = test all).
    pub filter: String,
    /// Test only the peer with exactly this name; overrides `filter`.
    pub target: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            duration: Duration::from_secs(10),
            filter: "tailperf".to_string(),
            target: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn target(&self) -> Option<&str> {
        Some(self.target.as_str()).filter(|t| !t.is_empty())
    }

    pub fn filter(&self) -> Option<&str> {
        Some(self.filter.as_str()).filter(|f| !f.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// How to reach the local Tailscale daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Path (or bare command name resolved via `$PATH`) to the tailscale CLI.
    pub tailscale_path: String,
    /// Daemon socket; `None` uses the CLI's default.
    pub socket: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            tailscale_path: "tailscale".to_string(),
            socket: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
