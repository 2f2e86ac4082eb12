//! Engine-level error definitions

use thiserror::Error;

use crate::platform::PlatformError;

/// Failure attached to an `Error` activity
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Content generation failed: {0}")]
    Content(String),

    /// A panic caught at a worker boundary
    #[error("Worker fault: {0}")]
    Fault(String),
}

/// Errors raised while preparing a behavior plan
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Failed to build fixture: {0}")]
    Fixture(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}
