//! Simulated partner system for `conduit demo`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use conduit_core::domain::{
    ExecutorError, ExportRequest, FileImportRequest, ImportRequest, WorkOutcome,
};
use conduit_core::ports::WorkExecutor;

/// Fails the first `remaining_failures` calls, then succeeds.
pub(crate) struct SimulatedExecutor {
    remaining_failures: AtomicU32,
    latency: Duration,
}

impl SimulatedExecutor {
    pub(crate) fn new(failures: u32, latency: Duration) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            latency,
        }
    }

    async fn call(&self, what: &str) -> Result<(), ExecutorError> {
        tokio::time::sleep(self.latency).await;
        let left = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match left {
            Ok(left) => Err(ExecutorError::Transport(format!(
                "connection refused ({what}, simulated, left={left})"
            ))),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl WorkExecutor for SimulatedExecutor {
    async fn export(&self, request: &ExportRequest) -> Result<WorkOutcome, ExecutorError> {
        self.call("export").await?;
        Ok(WorkOutcome::success().with_detail(format!(
            "exported {} {} record(s)",
            request.entity_ids.len(),
            request.entity_type
        )))
    }

    async fn import(&self, request: &ImportRequest) -> Result<WorkOutcome, ExecutorError> {
        self.call("import").await?;
        if request.validate_only {
            return Ok(WorkOutcome::success().with_detail("validation only, nothing written"));
        }
        let source = request.source_type.as_deref().unwrap_or("partner");
        Ok(WorkOutcome::success().with_detail(format!(
            "imported {} from {source}",
            request.entity_type
        )))
    }

    async fn import_file(&self, request: &FileImportRequest) -> Result<WorkOutcome, ExecutorError> {
        self.call("file import").await?;
        Ok(WorkOutcome::success().with_detail(format!(
            "read {} byte(s) from {}",
            request.content.len(),
            request.file_name
        )))
    }
}
