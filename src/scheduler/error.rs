//! Error types for the scheduler.

use thiserror::Error;

/// Errors returned by [`RequestManager`](super::RequestManager)
/// lifecycle operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start()` was called on a manager that already started once.
    ///
    /// A manager is single-use: after `stop()` it stays stopped.
    #[error("scheduler already started")]
    AlreadyStarted,

    /// The configured worker count is zero.
    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),
}
