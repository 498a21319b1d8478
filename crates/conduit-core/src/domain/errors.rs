//! Error types shared across the crate.
//!
//! - `JobError` is what callers of the manager see.
//! - `StoreError` comes out of a `JobStore`.
//! - `ExecutorError` comes out of a `WorkExecutor`; it never reaches the
//!   submitter, it is turned into a FAILED job.

use thiserror::Error;

use super::ids::JobId;
use super::job::JobStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value:?}")]
pub struct ParseEnumError {
    what: &'static str,
    value: String,
}

impl ParseEnumError {
    pub fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// A status change the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {job_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store backend error: {0}")]
    Backend(String),

    #[error("corrupt job record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// The partner system could not be reached or the call timed out.
    #[error("{0}")]
    Transport(String),

    /// The partner system answered with an error.
    #[error("{0}")]
    Remote(String),

    /// The executor panicked; caught at the worker boundary.
    #[error("executor panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found with ID: {0}")]
    NotFound(String),

    #[error("job store failure: {0}")]
    Storage(#[from] StoreError),

    #[error("worker queue is full, job {job_id} was rejected")]
    QueueFull { job_id: JobId },

    #[error("worker pool is shut down, job {job_id} was rejected")]
    PoolClosed { job_id: JobId },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}
