//! Job record and its state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ParseEnumError, TransitionError};
use super::ids::JobId;

/// Kind of integration task a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Export,
    Import,
    FileImport,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Export => "EXPORT",
            JobKind::Import => "IMPORT",
            JobKind::FileImport => "FILE_IMPORT",
        }
    }

    /// Human label used at the start of result messages ("Export failed", ...).
    pub fn label(self) -> &'static str {
        match self {
            JobKind::Export => "Export",
            JobKind::Import => "Import",
            JobKind::FileImport => "File import",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EXPORT" => Ok(JobKind::Export),
            "IMPORT" => Ok(JobKind::Import),
            "FILE_IMPORT" => Ok(JobKind::FileImport),
            _ => Err(ParseEnumError::new("job kind", s)),
        }
    }
}

/// Job status.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed (executor failure, or reclaimer timeout)
/// - Pending -> Failed (rejected by a full worker pool)
/// - Pending | Processing -> Cancelled (administrative cancel)
///
/// Completed, Failed and Cancelled are terminal: nothing leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Persisted, waiting for a worker.
    Pending,

    /// A worker is running the executor call.
    Processing,

    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses the retention purge may delete. Cancelled jobs are kept.
    pub fn is_purgeable(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            _ => Err(ParseEnumError::new("job status", s)),
        }
    }
}

/// One integration job as persisted in the job store.
///
/// Design:
/// - The store holds the single source of truth; this is a snapshot of it.
/// - Status changes go through the transition methods so that the timestamp
///   invariants hold: `started_at` is set iff the status is not Pending, and
///   `completed_at` is set iff the status is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,

    /// Descriptive text captured at submission, for diagnostics only.
    pub request_summary: String,

    /// Human readable outcome, set on entering a terminal status.
    pub result_message: Option<String>,

    /// Optional detail reported by the executor on success.
    pub result_data: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: JobId,
        kind: JobKind,
        request_summary: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            request_summary: request_summary.into(),
            result_message: None,
            result_data: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Pending -> Processing.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        Ok(())
    }

    /// Processing -> Completed.
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        message: impl Into<String>,
        data: Option<String>,
    ) -> Result<(), TransitionError> {
        self.settle(JobStatus::Completed, now, message.into())?;
        self.result_data = data;
        Ok(())
    }

    /// Processing (or Pending, on rejection) -> Failed.
    pub fn fail(
        &mut self,
        now: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.settle(JobStatus::Failed, now, message.into())
    }

    /// Pending | Processing -> Cancelled.
    pub fn cancel(
        &mut self,
        now: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.settle(JobStatus::Cancelled, now, message.into())
    }

    /// True when the job is Processing and started strictly before `cutoff`.
    pub fn started_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.started_at.is_some_and(|started| started < cutoff)
    }

    fn settle(
        &mut self,
        next: JobStatus,
        now: DateTime<Utc>,
        message: String,
    ) -> Result<(), TransitionError> {
        self.check(next)?;
        // A job settled straight from Pending never had a start; stamp one so
        // that started_at stays set for every non-pending status.
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = next;
        self.result_message = Some(message);
        self.completed_at = Some(now);
        Ok(())
    }

    fn check(&self, next: JobStatus) -> Result<(), TransitionError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError {
                job_id: self.id,
                from: self.status,
                to: next,
            })
        }
    }
}
