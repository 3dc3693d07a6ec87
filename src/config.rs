//! Relay configuration.
//!
//! Values come from built-in defaults, then an optional JSON file at
//! `<config dir>/motion-relay/config.json`, then the `MOTION_RELAY_PORT`
//! environment variable. The server itself never reads configuration; the
//! binary resolves it once, installs logging from it, then validates it so
//! validation warnings reach the log.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::server::DEFAULT_PORT;

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "MOTION_RELAY_PORT";

/// Lowest port a user may configure.
pub const MIN_PORT: u16 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen port (1024-65535).
    pub port: u16,

    /// Interface to bind. Loopback unless deliberately changed.
    pub bind_address: IpAddr,

    /// Size of the I/O worker pool.
    pub worker_threads: usize,

    /// Emission rate of the simulated motion source.
    pub sample_rate_hz: f64,

    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            worker_threads: 2,
            sample_rate_hz: 60.0,
            log_filter: "motion_relay=info".to_string(),
        }
    }
}

impl Config {
    /// Resolves configuration from the default file location and environment.
    ///
    /// The result is not validated; call [`Config::validate`] once logging
    /// is up.
    pub fn resolve() -> Result<Self> {
        Self::resolve_from(
            Self::default_path().as_deref(),
            std::env::var(PORT_ENV).ok().as_deref(),
        )
    }

    /// Resolves configuration from an optional file and port override.
    pub fn resolve_from(path: Option<&Path>, port_override: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_port_override(port_override)?;
        Ok(config)
    }

    /// Reads a JSON config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        tracing::debug!(path = ?path, "Loaded config file");
        Ok(config)
    }

    /// Returns the default config file path, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("motion-relay").join("config.json"))
    }

    /// Applies a port given as text, e.g. from the environment.
    pub fn apply_port_override(&mut self, value: Option<&str>) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        self.port = value
            .trim()
            .parse()
            .map_err(|_| RelayError::Config(format!("{PORT_ENV} is not a port: {value:?}")))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port < MIN_PORT {
            return Err(RelayError::InvalidPort(self.port));
        }
        if self.worker_threads == 0 {
            return Err(RelayError::Config("worker_threads must be at least 1".into()));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(RelayError::Config(format!(
                "sample_rate_hz must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        if !self.bind_address.is_loopback() {
            tracing::warn!(
                address = %self.bind_address,
                "Binding a non-loopback address; clients are not authenticated"
            );
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
