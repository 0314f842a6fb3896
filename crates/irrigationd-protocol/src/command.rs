//! Command definitions for the irrigationd line protocol

use crate::types::ZoneId;

/// A command understood by irrigationd
///
/// Every command addresses exactly one zone. Serialization lives in
/// [`Command::encode`] so the match stays exhaustive when the protocol
/// grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a zone's valve for a bounded number of seconds
    Start { zone: ZoneId, duration_secs: u64 },
    /// Close a zone's valve immediately
    Stop { zone: ZoneId },
    /// Query the daemon's view of a zone
    Status { zone: ZoneId },
}

impl Command {
    /// Encode as a single newline-terminated wire line
    #[must_use]
    pub fn encode(&self) -> String {
        self.encode_with_token(None)
    }

    /// Encode, appending `TOKEN=<t>` when the daemon requires auth.
    ///
    /// The token rides on every command line; the field order is part
    /// of the external wire contract.
    #[must_use]
    pub fn encode_with_token(&self, token: Option<&str>) -> String {
        let mut line = match self {
            Command::Start {
                zone,
                duration_secs,
            } => format!("START {zone} {duration_secs}"),
            Command::Stop { zone } => format!("STOP {zone}"),
            Command::Status { zone } => format!("STATUS {zone}"),
        };
        if let Some(token) = token {
            line.push_str(&format!(" TOKEN={token}"));
        }
        line.push('\n');
        line
    }

    /// Zone this command addresses
    #[must_use]
    pub fn zone(&self) -> ZoneId {
        match self {
            Command::Start { zone, .. } | Command::Stop { zone } | Command::Status { zone } => {
                *zone
            }
        }
    }
}
