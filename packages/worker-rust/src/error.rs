//! Error types for admission, execution, and lifecycle.

use convoy_core::TransformError;

use crate::config::ConfigError;
use crate::state::WorkerState;

/// Synchronous rejection returned by `submit()`. No task is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("worker not operational (state: {state})")]
    NotOperational { state: WorkerState },
    #[error("maximum queue size ({capacity}) reached, work has been discarded")]
    QueueFull { capacity: usize },
}

/// Failure of an accepted item, delivered only through its completion handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("cancelled before execution by worker shutdown")]
    Cancelled,
    #[error("transform panicked: {message}")]
    Panicked { message: String },
}

/// Misuse of `start()` or failure to bring the pool up.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("worker already started")]
    AlreadyStarted,
    #[error("worker has been stopped and cannot be restarted")]
    Terminated,
    #[error("invalid worker configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("failed to spawn pool thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}

/// The pool still had running tasks after both shutdown grace periods.
///
/// Not fatal: the worker is `Stopped` regardless and the stragglers are
/// detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool did not terminate: {still_running} task(s) still running")]
pub struct ShutdownIncomplete {
    pub still_running: usize,
}
