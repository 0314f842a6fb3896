//! Configuration for the irrigation daemon bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default irrigationd port
pub const DEFAULT_PORT: u16 = 4242;

/// Default number of zones
pub const DEFAULT_ZONES: u16 = 14;

/// Default run length when a start request carries no duration
pub const DEFAULT_DURATION_SECS: u64 = 300;

/// Installation options: daemon endpoint, zone count, default duration.
///
/// Supplied by the platform's options store and re-validated on every
/// update via [`IrrigationConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrrigationConfig {
    /// Display name for the installation
    #[serde(default = "default_name")]
    pub name: String,
    /// irrigationd host
    pub host: String,
    /// irrigationd port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Auth token the daemon expects on every command, if any
    #[serde(default)]
    pub token: Option<String>,
    /// Number of zones, addressed 1..=zones
    #[serde(default = "default_zones")]
    pub zones: u16,
    /// Default run length in seconds
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
}

fn default_name() -> String {
    "Irrigation Controller".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_zones() -> u16 {
    DEFAULT_ZONES
}

fn default_duration_secs() -> u64 {
    DEFAULT_DURATION_SECS
}

impl IrrigationConfig {
    /// Config for `host:port` with default zone count and duration
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            name: default_name(),
            host: host.into(),
            port,
            token: None,
            zones: DEFAULT_ZONES,
            default_duration_secs: DEFAULT_DURATION_SECS,
        }
    }

    /// Check the options for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.zones == 0 {
            return Err(ConfigError::NoZones);
        }
        if self.default_duration_secs == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }

    /// Default run length as a [`Duration`]
    #[must_use]
    pub fn default_duration(&self) -> Duration {
        Duration::from_secs(self.default_duration_secs)
    }
}

/// Invalid configuration options
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Host field empty or whitespace
    #[error("daemon host must not be empty")]
    EmptyHost,

    /// Port 0 is not routable
    #[error("daemon port must be non-zero")]
    InvalidPort,

    /// At least one zone is required
    #[error("zone count must be at least 1")]
    NoZones,

    /// A zero default duration would start sessions that never run
    #[error("default duration must be at least 1 second")]
    ZeroDuration,
}
