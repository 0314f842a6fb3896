//! Error types for the cycle engine

use thiserror::Error;

/// Errors raised when launching a cycle
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CycleError {
    /// The step list was empty
    #[error("cycle has no steps")]
    Empty,
}
