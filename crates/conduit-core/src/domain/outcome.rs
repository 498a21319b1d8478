//! Outcome model: what an executor reports back for one unit of work.
//!
//! A raised error is a separate channel (`ExecutorError`); the manager treats
//! both a Failure outcome and an error as a FAILED job.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOutcome {
    pub kind: OutcomeKind,

    /// Why the partner refused the work, if it said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Free-form result detail, kept on the job as `result_data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WorkOutcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            reason: None,
            detail: None,
        }
    }

    /// Failure without an explanation (e.g. a non-2xx answer with no body).
    pub fn failure() -> Self {
        Self {
            kind: OutcomeKind::Failure,
            reason: None,
            detail: None,
        }
    }

    pub fn failure_with(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::failure()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// Executors that only know "it worked or it didn't".
impl From<bool> for WorkOutcome {
    fn from(ok: bool) -> Self {
        if ok { Self::success() } else { Self::failure() }
    }
}
