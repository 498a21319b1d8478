//! Domain model (ids, jobs, outcomes, requests, errors).

pub mod errors;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod request;

pub use errors::{ExecutorError, JobError, ParseEnumError, StoreError, TransitionError};
pub use ids::{JobId, ParseJobIdError};
pub use job::{Job, JobKind, JobStatus};
pub use outcome::{OutcomeKind, WorkOutcome};
pub use request::{ExportRequest, FileImportRequest, ImportRequest};
