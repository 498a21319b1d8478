//! JobLifecycleManager - submit, execute, query
//!
//! # フロー
//! 1. `submit` が PENDING の job を保存し、`JobRunner` を pool に渡す
//! 2. runner が job を再読込 → PROCESSING に遷移 → executor 呼び出し
//! 3. outcome に応じて COMPLETED / FAILED に確定
//! 4. PROCESSING への書き込みが retry 後も失敗したら、最後に一度だけ FAILED を試みる
//!
//! 作成後の書き込みはすべて、書き手が最後に見た status を条件とする
//! conditional update。runner / reclaimer / `cancel` が互いの終端 status を
//! 上書きすることはない。

use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinError;

use crate::app::retry::PersistRetryPolicy;
use crate::app::status::JobStatusView;
use crate::app::worker_pool::{PoolError, WorkerPool};
use crate::domain::{ExecutorError, Job, JobError, JobId, JobKind, JobStatus, StoreError};
use crate::observability::JobCounts;
use crate::ports::{Clock, IdGenerator, JobStore, PageRequest, WorkItem};

pub const CANCELLED_MESSAGE: &str = "Job cancelled by administrator";

pub struct JobLifecycleManager {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    pool: WorkerPool,
    persist_retry: PersistRetryPolicy,
}

impl JobLifecycleManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        pool: WorkerPool,
        persist_retry: PersistRetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            pool,
            persist_retry,
        }
    }

    /// Persist a new PENDING job and schedule `work` for it.
    ///
    /// Returns as soon as the job is stored and accepted by the pool. A store
    /// failure here is returned as-is and no job exists. A pool rejection
    /// leaves the job FAILED and is returned as `QueueFull` / `PoolClosed`.
    pub async fn submit(
        &self,
        kind: JobKind,
        request_summary: impl Into<String>,
        work: WorkItem,
    ) -> Result<JobId, JobError> {
        let job = Job::new(
            self.ids.generate_job_id(),
            kind,
            request_summary,
            self.clock.now(),
        );
        let job_id = job.id;

        if let Err(err) = self.store.save(&job).await {
            tracing::error!(%job_id, %kind, error = %err, "failed to persist new job");
            return Err(err.into());
        }
        tracing::info!(%job_id, %kind, "job submitted");

        let runner = JobRunner {
            job_id,
            kind,
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            persist_retry: self.persist_retry.clone(),
        };

        match self.pool.try_submit(Box::pin(runner.execute(work))) {
            Ok(dispatch) => {
                tracing::debug!(%job_id, ?dispatch, "job scheduled");
                Ok(job_id)
            }
            Err(err) => {
                tracing::warn!(%job_id, %kind, error = %err, "job rejected by worker pool");
                self.reject(job, err).await;
                Err(match err {
                    PoolError::Full => JobError::QueueFull { job_id },
                    PoolError::Closed => JobError::PoolClosed { job_id },
                })
            }
        }
    }

    async fn reject(&self, mut job: Job, err: PoolError) {
        let message = format!("{} rejected: {err}", job.kind.label());
        if job.fail(self.clock.now(), message).is_err() {
            return;
        }
        if let Err(store_err) = self.store.update_if_status(&job, JobStatus::Pending).await {
            tracing::error!(job_id = %job.id, error = %store_err, "failed to mark rejected job");
        }
    }

    /// Current status of a job. Ids that do not parse are simply not found.
    pub async fn get_status(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        let id: JobId = job_id
            .parse()
            .map_err(|_| JobError::NotFound(job_id.to_string()))?;
        let job = self.find_job(id).await?;
        Ok(JobStatusView::from(&job))
    }

    pub async fn find_job(&self, id: JobId) -> Result<Job, JobError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Move a PENDING or PROCESSING job to CANCELLED.
    ///
    /// A running executor call is not interrupted; its result is dropped
    /// when it tries to settle the job.
    pub async fn cancel(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        let id: JobId = job_id
            .parse()
            .map_err(|_| JobError::NotFound(job_id.to_string()))?;

        // Status only moves forward, so this loops at most twice.
        loop {
            let mut job = self.find_job(id).await?;
            let seen = job.status;
            job.cancel(self.clock.now(), CANCELLED_MESSAGE)?;
            if self.store.update_if_status(&job, seen).await? {
                tracing::info!(job_id = %id, from = %seen, "job cancelled");
                return Ok(JobStatusView::from(&job));
            }
            tracing::debug!(job_id = %id, "job changed while cancelling, reloading");
        }
    }

    pub async fn list(&self, status: JobStatus, page: PageRequest) -> Result<Vec<Job>, JobError> {
        Ok(self.store.find_by_status(status, page).await?)
    }

    pub async fn list_by_kind(
        &self,
        kind: JobKind,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, JobError> {
        Ok(self.store.find_by_kind_and_status(kind, status, page).await?)
    }

    pub async fn counts(&self) -> Result<JobCounts, JobError> {
        Ok(self.store.count_by_status().await?)
    }

    /// Stop taking jobs, finish the queued ones and join the workers.
    pub async fn shutdown(&self) {
        self.pool.shutdown_and_join().await;
    }
}

/// Runs one job, start to finish, on a pool worker.
struct JobRunner {
    job_id: JobId,
    kind: JobKind,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    persist_retry: PersistRetryPolicy,
}

impl JobRunner {
    async fn execute(self, work: WorkItem) {
        if let Err(err) = self.run(work).await {
            tracing::error!(job_id = %self.job_id, kind = %self.kind, error = %err, "job execution aborted");
        }
    }

    async fn run(&self, work: WorkItem) -> Result<(), JobError> {
        let mut job = match self.begin().await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(()),
            Err(JobError::Storage(err)) => {
                self.fail_unstarted(&err).await;
                return Err(JobError::Storage(err));
            }
            Err(err) => return Err(err),
        };
        tracing::info!(job_id = %self.job_id, kind = %self.kind, "job processing");

        let result = match tokio::spawn(work.run()).await {
            Ok(result) => result,
            Err(join_err) => Err(ExecutorError::Panicked(panic_message(join_err))),
        };

        let label = self.kind.label();
        let now = self.clock.now();
        match result {
            Ok(outcome) if outcome.is_success() => {
                job.complete(now, format!("{label} completed successfully"), outcome.detail)?;
            }
            Ok(outcome) => {
                let message = match outcome.reason {
                    Some(reason) => format!("{label} failed: {reason}"),
                    None => format!("{label} failed"),
                };
                tracing::warn!(job_id = %self.job_id, kind = %self.kind, %message, "executor reported failure");
                job.fail(now, message)?;
            }
            Err(err) => {
                tracing::error!(job_id = %self.job_id, kind = %self.kind, error = %err, "executor error");
                job.fail(now, format!("{label} failed: {err}"))?;
            }
        }

        let settled = self
            .persist_retry
            .run("settle job", || {
                self.store.update_if_status(&job, JobStatus::Processing)
            })
            .await?;
        if settled {
            tracing::info!(job_id = %self.job_id, status = %job.status, "job finished");
        } else {
            tracing::warn!(
                job_id = %self.job_id,
                status = %job.status,
                "job already settled by another writer, result discarded"
            );
        }
        Ok(())
    }

    /// Load the job and record PENDING -> PROCESSING. `None` when the job is
    /// no longer ours to run.
    async fn begin(&self) -> Result<Option<Job>, JobError> {
        let loaded = self
            .persist_retry
            .run("load job", || self.store.find_by_id(self.job_id))
            .await?;
        let Some(mut job) = loaded else {
            return Err(JobError::NotFound(self.job_id.to_string()));
        };
        if job.status != JobStatus::Pending {
            tracing::info!(job_id = %self.job_id, status = %job.status, "job no longer pending, skipping");
            return Ok(None);
        }

        job.start(self.clock.now())?;
        let started = self
            .persist_retry
            .run("mark job processing", || {
                self.store.update_if_status(&job, JobStatus::Pending)
            })
            .await?;
        if !started {
            tracing::info!(job_id = %self.job_id, "job changed before it started, skipping");
            return Ok(None);
        }
        Ok(Some(job))
    }

    /// One last write after the start could not be recorded: a PENDING job
    /// is never picked up again, so settle it as FAILED.
    async fn fail_unstarted(&self, cause: &StoreError) {
        let mut job = match self.store.find_by_id(self.job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Pending => job,
            Ok(_) => return,
            Err(err) => {
                tracing::error!(job_id = %self.job_id, error = %err, "job left pending, store unreachable");
                return;
            }
        };
        let message = format!("{} failed: {cause}", self.kind.label());
        if let Err(err) = job.fail(self.clock.now(), message) {
            tracing::error!(job_id = %self.job_id, error = %err, "job left pending");
            return;
        }
        match self.store.update_if_status(&job, JobStatus::Pending).await {
            Ok(true) => tracing::warn!(job_id = %self.job_id, kind = %self.kind, "job failed before it started"),
            Ok(false) => {}
            Err(err) => {
                tracing::error!(job_id = %self.job_id, error = %err, "job left pending, store unreachable");
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
