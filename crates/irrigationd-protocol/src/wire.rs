//! Response parsing for the irrigationd line protocol
//!
//! The daemon answers every command with exactly one line:
//!
//! ```text
//! OK
//! ERR <reason>
//! ZONE=<id> RUNNING=<0|1> REMAINING=<seconds>
//! ```

use crate::types::{DaemonError, ZoneStatus};

/// A single response line from irrigationd
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command acknowledged
    Ok,
    /// Command refused by the daemon
    Err(String),
    /// Status payload answering a STATUS query
    Status(ZoneStatus),
}

impl Response {
    /// Parse one response line (trailing newline tolerated)
    pub fn parse(line: &str) -> Result<Self, DaemonError> {
        let line = line.trim();
        if line == "OK" {
            return Ok(Response::Ok);
        }
        if let Some(reason) = line.strip_prefix("ERR") {
            if reason.is_empty() || reason.starts_with(' ') {
                return Ok(Response::Err(reason.trim().to_string()));
            }
        }
        if line.starts_with("ZONE=") {
            return Ok(Response::Status(ZoneStatus::parse(line)?));
        }
        Err(DaemonError::Protocol(format!(
            "unrecognized response: {line}"
        )))
    }
}
