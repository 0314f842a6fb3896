//! Shared types and errors for the irrigationd protocol

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zone identifier, 1..=configured zone count.
///
/// Stable for the lifetime of a configuration; both the entity layer
/// and the daemon address zones by this number.
pub type ZoneId = u16;

/// Daemon-reported state for one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStatus {
    /// Zone the status refers to
    pub zone: ZoneId,
    /// Whether the daemon has the valve open
    pub running: bool,
    /// Seconds left before the daemon closes the valve on its own
    pub remaining_secs: u64,
}

impl ZoneStatus {
    /// Parse a status line of the form `ZONE=<id> RUNNING=<0|1> REMAINING=<secs>`
    pub(crate) fn parse(line: &str) -> Result<Self, DaemonError> {
        let mut zone = None;
        let mut running = None;
        let mut remaining = None;

        for field in line.split_whitespace() {
            let Some((key, value)) = field.split_once('=') else {
                return Err(DaemonError::Protocol(format!(
                    "malformed status field: {field}"
                )));
            };
            match key {
                "ZONE" => {
                    zone = Some(value.parse::<ZoneId>().map_err(|_| {
                        DaemonError::Protocol(format!("invalid zone id: {value}"))
                    })?);
                }
                "RUNNING" => {
                    running = Some(match value {
                        "1" => true,
                        "0" => false,
                        _ => {
                            return Err(DaemonError::Protocol(format!(
                                "invalid RUNNING value: {value}"
                            )))
                        }
                    });
                }
                "REMAINING" => {
                    remaining = Some(value.parse::<u64>().map_err(|_| {
                        DaemonError::Protocol(format!("invalid REMAINING value: {value}"))
                    })?);
                }
                _ => {
                    // Unknown keys are tolerated so the daemon can grow its payload
                    tracing::debug!("ignoring unknown status field: {}", field);
                }
            }
        }

        match (zone, running) {
            (Some(zone), Some(running)) => Ok(Self {
                zone,
                running,
                remaining_secs: remaining.unwrap_or(0),
            }),
            _ => Err(DaemonError::Protocol(format!(
                "incomplete status line: {line}"
            ))),
        }
    }
}

/// Errors surfaced by the daemon client
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Daemon unreachable at the configured host/port
    #[error("connection error: {0}")]
    Connection(String),

    /// No response within the command timeout
    #[error("daemon did not respond in time")]
    Timeout,

    /// Malformed or unexpected response line
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reconnect attempts exhausted
    #[error("daemon unavailable after {0} reconnect attempts")]
    Unavailable(u32),

    /// The client actor has shut down
    #[error("daemon client closed")]
    Closed,
}

impl DaemonError {
    /// Whether reconnecting and resending the command may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

/// Connection lifecycle events broadcast by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonEvent {
    /// First link to the daemon established
    Connected,
    /// Link lost or deliberately released
    Disconnected,
    /// Link re-established after a drop; callers should reconcile zone state
    Reconnected,
}
