//! Status view returned to callers polling a job.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,

    /// Result message once the job is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC 3339, UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            message: job.result_message.clone(),
            completed_at: job
                .completed_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}
