//! irrigationd line protocol client
//!
//! This crate implements the newline-delimited TCP protocol used to
//! communicate with an `irrigationd` valve-control daemon.

pub mod client;
pub mod command;
pub mod types;
pub mod wire;

pub use client::DaemonClient;
pub use command::Command;
pub use types::{DaemonError, DaemonEvent, ZoneId, ZoneStatus};
pub use wire::Response;
