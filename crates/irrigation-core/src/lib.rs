//! Zone session management for the irrigation daemon bridge
//!
//! This crate owns the authoritative per-zone run state: it turns
//! "run for N seconds" requests into time-bounded sessions, drives the
//! daemon through the protocol client, and reconciles local state with
//! daemon truth after an outage.

pub mod config;
pub mod controller;
pub mod link;
pub mod session;
pub mod zone;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ConfigError, IrrigationConfig};
pub use controller::ZoneController;
pub use link::DaemonLink;
pub use session::{SessionOwner, ZoneSession, ZoneState};
pub use zone::{ZoneError, ZoneEvent, ZoneManager};
