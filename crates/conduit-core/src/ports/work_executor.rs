//! WorkExecutor port - the partner-system client, seen from the core.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::domain::{ExecutorError, ExportRequest, FileImportRequest, ImportRequest, WorkOutcome};

/// Performs one unit of work per job kind.
///
/// The core places no retry around these calls: a Failure outcome or an
/// error settles the job as FAILED, and resubmitting is the caller's call.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn export(&self, request: &ExportRequest) -> Result<WorkOutcome, ExecutorError>;

    async fn import(&self, request: &ImportRequest) -> Result<WorkOutcome, ExecutorError>;

    async fn import_file(
        &self,
        request: &FileImportRequest,
    ) -> Result<WorkOutcome, ExecutorError>;
}

pub type WorkFuture = Pin<Box<dyn Future<Output = Result<WorkOutcome, ExecutorError>> + Send>>;

/// A deferred executor call, bound to its request, run once by a worker.
pub struct WorkItem(Box<dyn FnOnce() -> WorkFuture + Send>);

impl WorkItem {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<WorkOutcome, ExecutorError>> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    pub fn run(self) -> WorkFuture {
        (self.0)()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkItem(..)")
    }
}
