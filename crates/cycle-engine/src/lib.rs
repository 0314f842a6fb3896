//! Sequential cycle orchestration for the irrigation bridge
//!
//! Drives an ordered list of (zone, duration) steps through the zone
//! session managers, one zone at a time, isolating per-step failures
//! and honoring early cancellation.

pub mod error;
pub mod model;
pub mod orchestrator;

pub use error::CycleError;
pub use model::{CycleEvent, CycleStep};
pub use orchestrator::{CycleHandle, CycleOrchestrator};
