//! Cycle data model

use irrigationd_protocol::ZoneId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of an irrigation cycle: run a zone for a fixed duration.
///
/// Step lists are built by the caller; a delay between zones is
/// expressed as a step addressing an unused zone, not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStep {
    /// Zone to run
    pub zone: ZoneId,
    /// Run length in seconds
    pub duration_secs: u64,
}

impl CycleStep {
    #[must_use]
    pub fn new(zone: ZoneId, duration_secs: u64) -> Self {
        Self {
            zone,
            duration_secs,
        }
    }
}

/// Progress events emitted while a cycle runs
#[derive(Debug, Clone)]
pub enum CycleEvent {
    /// The cycle passed its scheduled start and began stepping
    CycleStarted { cycle: Uuid, steps: usize },
    /// A step's zone session was acknowledged
    StepStarted {
        cycle: Uuid,
        index: usize,
        step: CycleStep,
    },
    /// A step's zone returned to Idle
    StepCompleted { cycle: Uuid, index: usize },
    /// A step failed to start and was skipped; the cycle continues
    StepSkipped {
        cycle: Uuid,
        index: usize,
        error: String,
    },
    /// Every step was attempted
    CycleCompleted { cycle: Uuid },
    /// The cycle was cancelled at the given step index
    CycleCancelled { cycle: Uuid, index: usize },
}
