//! Scheduler error types.

use thiserror::Error;

use blockpool_core::ConfigError;
use blockpool_state::{JobId, StateError, WorkerId};

/// Errors that can occur while seeding, dispatching, or executing jobs.
///
/// Everything except `InvalidConfiguration` and `State` is an invariant
/// violation: the run fails instead of waiting on a state that can no
/// longer change.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    #[error("job queue is empty")]
    EmptyQueue,

    #[error("worker pool is at capacity ({ceiling} workers)")]
    CapacityExceeded { ceiling: u32 },

    #[error("invalid state transition for {subject}: {from} -> {to}")]
    InvalidStateTransition {
        subject: String,
        from: String,
        to: String,
    },

    #[error("worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("execution substrate is no longer accepting work")]
    SubstrateClosed,

    #[error("execution task failed: {0}")]
    Task(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl SchedulerError {
    pub(crate) fn transition(
        subject: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        SchedulerError::InvalidStateTransition {
            subject: subject.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
