//! IntegrationService - request-level API over the manager.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::app::manager::JobLifecycleManager;
use crate::app::status::JobStatusView;
use crate::domain::{
    ExportRequest, FileImportRequest, ImportRequest, JobError, JobId, JobKind, JobStatus,
};
use crate::ports::{WorkExecutor, WorkItem};

/// What a submitter gets back right away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

impl SubmitReceipt {
    fn pending(job_id: JobId, kind: JobKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Pending,
            message: format!("{} job created successfully", kind.label()),
        }
    }
}

#[derive(Clone)]
pub struct IntegrationService {
    manager: Arc<JobLifecycleManager>,
    executor: Arc<dyn WorkExecutor>,
}

impl IntegrationService {
    pub fn new(manager: Arc<JobLifecycleManager>, executor: Arc<dyn WorkExecutor>) -> Self {
        Self { manager, executor }
    }

    pub async fn export(&self, request: ExportRequest) -> Result<SubmitReceipt, JobError> {
        let summary = request.summary();
        let executor = Arc::clone(&self.executor);
        let work = WorkItem::new(move || async move { executor.export(&request).await });
        self.submit(JobKind::Export, summary, work).await
    }

    pub async fn import(&self, request: ImportRequest) -> Result<SubmitReceipt, JobError> {
        let summary = request.summary();
        let executor = Arc::clone(&self.executor);
        let work = WorkItem::new(move || async move { executor.import(&request).await });
        self.submit(JobKind::Import, summary, work).await
    }

    /// Empty uploads are refused before a job is created.
    pub async fn import_file(&self, request: FileImportRequest) -> Result<SubmitReceipt, JobError> {
        if request.is_empty() {
            return Err(JobError::InvalidRequest("File is empty".into()));
        }
        let summary = request.summary();
        let executor = Arc::clone(&self.executor);
        let work = WorkItem::new(move || async move { executor.import_file(&request).await });
        self.submit(JobKind::FileImport, summary, work).await
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        self.manager.get_status(job_id).await
    }

    async fn submit(
        &self,
        kind: JobKind,
        summary: String,
        work: WorkItem,
    ) -> Result<SubmitReceipt, JobError> {
        let job_id = self.manager.submit(kind, summary, work).await?;
        Ok(SubmitReceipt::pending(job_id, kind))
    }
}
