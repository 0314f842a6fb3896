//! Zone session state

use irrigationd_protocol::ZoneId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lifecycle state of one zone's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneState {
    /// No active session
    Idle,
    /// Valve open, auto-stop timer armed
    Running,
    /// Stop issued, waiting for the daemon's acknowledgement
    Stopping,
}

/// Who requested the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOwner {
    /// Direct user action through the entity layer
    Manual,
    /// A scheduled cycle run
    Cycle,
}

/// Authoritative local state for one zone.
///
/// Exactly one session exists per zone at any time; it is mutated only
/// by the owning [`crate::ZoneManager`] and read elsewhere as a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSession {
    /// Zone this session belongs to
    pub zone: ZoneId,
    /// Current state
    pub state: ZoneState,
    /// Present iff the session is not Idle
    #[serde(default)]
    pub owner: Option<SessionOwner>,
    /// When the session started; present iff not Idle
    #[serde(skip)]
    pub started_at: Option<Instant>,
    /// Requested run length; present iff not Idle
    #[serde(default)]
    pub requested_duration: Option<Duration>,
}

impl ZoneSession {
    /// Fresh idle session for a zone
    #[must_use]
    pub fn idle(zone: ZoneId) -> Self {
        Self {
            zone,
            state: ZoneState::Idle,
            owner: None,
            started_at: None,
            requested_duration: None,
        }
    }

    /// Whether a session is in progress (Running or Stopping)
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.state, ZoneState::Idle)
    }

    /// Time left before the auto-stop fires, `None` when Idle
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let started = self.started_at?;
        let requested = self.requested_duration?;
        Some(requested.saturating_sub(started.elapsed()))
    }
}
