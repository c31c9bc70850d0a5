//! Error types for Trellis core systems.

use std::fmt;

/// The main error type for Trellis core operations.
#[derive(Debug)]
pub enum TrellisError {
    /// Scheduler-related error.
    Scheduler(SchedulerError),
}

impl fmt::Display for TrellisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduler(err) => write!(f, "Scheduler error: {err}"),
        }
    }
}

impl std::error::Error for TrellisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Scheduler(err) => Some(err),
        }
    }
}

/// Scheduler-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The task ID is invalid, cancelled, or has already executed.
    InvalidTaskId,
    /// The scheduler thread has stopped and no longer accepts tasks.
    ThreadStopped,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTaskId => write!(f, "Invalid or expired task ID"),
            Self::ThreadStopped => write!(f, "Scheduler thread has stopped"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<SchedulerError> for TrellisError {
    fn from(err: SchedulerError) -> Self {
        Self::Scheduler(err)
    }
}

/// A specialized Result type for Trellis core operations.
pub type Result<T> = std::result::Result<T, TrellisError>;
