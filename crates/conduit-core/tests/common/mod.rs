#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;
use ulid::Ulid;

use conduit_core::app::{App, AppBuilder, JobLifecycleManager, JobStatusView};
use conduit_core::config::{ConduitConfig, PoolSettings};
use conduit_core::domain::{
    ExecutorError, ExportRequest, FileImportRequest, ImportRequest, Job, JobId, JobKind,
    JobStatus, StoreError, WorkOutcome,
};
use conduit_core::impls::InMemoryJobStore;
use conduit_core::observability::JobCounts;
use conduit_core::ports::{Clock, JobStore, PageRequest, WorkExecutor};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// What the scripted partner does on every call.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    SucceedWith(&'static str),
    Refuse,
    RefuseWith(&'static str),
    Error(&'static str),
    Panic,
}

pub struct ScriptedExecutor {
    behavior: Behavior,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Every call waits for one permit on the returned gate.
    pub fn gated(behavior: Behavior) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Arc::new(Self {
            behavior,
            gate: Some(Arc::clone(&gate)),
            calls: AtomicUsize::new(0),
        });
        (executor, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn perform(&self) -> Result<WorkOutcome, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        match self.behavior {
            Behavior::Succeed => Ok(WorkOutcome::success()),
            Behavior::SucceedWith(detail) => Ok(WorkOutcome::success().with_detail(detail)),
            Behavior::Refuse => Ok(WorkOutcome::failure()),
            Behavior::RefuseWith(reason) => Ok(WorkOutcome::failure_with(reason)),
            Behavior::Error(text) => Err(ExecutorError::Transport(text.to_string())),
            Behavior::Panic => panic!("partner client crashed"),
        }
    }
}

#[async_trait]
impl WorkExecutor for ScriptedExecutor {
    async fn export(&self, _request: &ExportRequest) -> Result<WorkOutcome, ExecutorError> {
        self.perform().await
    }

    async fn import(&self, _request: &ImportRequest) -> Result<WorkOutcome, ExecutorError> {
        self.perform().await
    }

    async fn import_file(
        &self,
        _request: &FileImportRequest,
    ) -> Result<WorkOutcome, ExecutorError> {
        self.perform().await
    }
}

/// In-memory store that fails the next N saves / conditional updates.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryJobStore,
    failing_saves: AtomicUsize,
    failing_updates: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    fn trip(counter: &AtomicUsize) -> Result<(), StoreError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Backend("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        Self::trip(&self.failing_saves)?;
        self.inner.save(job).await
    }

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError> {
        Self::trip(&self.failing_updates)?;
        self.inner.update_if_status(job, expected).await
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        self.inner.find_by_status(status, page).await
    }

    async fn find_by_kind_and_status(
        &self,
        kind: JobKind,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        self.inner.find_by_kind_and_status(kind, status, page).await
    }

    async fn find_by_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        self.inner.find_by_created_between(start, end, page).await
    }

    async fn delete_all(&self, ids: &[JobId]) -> Result<usize, StoreError> {
        self.inner.delete_all(ids).await
    }

    async fn count_by_status(&self) -> Result<JobCounts, StoreError> {
        self.inner.count_by_status().await
    }
}

pub fn config(core_workers: usize, max_workers: usize, queue_capacity: usize) -> ConduitConfig {
    let mut config = ConduitConfig::default();
    config.pool = PoolSettings {
        core_workers,
        max_workers,
        queue_capacity,
    };
    config.persistence.base_delay_ms = 1;
    config
}

pub fn build_app(
    store: Arc<dyn JobStore>,
    executor: Arc<dyn WorkExecutor>,
    config: ConduitConfig,
) -> App {
    AppBuilder::new()
        .with_store(store)
        .with_executor(executor)
        .expect_executor()
        .with_config(config)
        .build()
        .expect("app builds")
}

pub fn build_app_with_clock(
    store: Arc<dyn JobStore>,
    executor: Arc<dyn WorkExecutor>,
    config: ConduitConfig,
    clock: Arc<dyn Clock>,
) -> App {
    AppBuilder::new()
        .with_store(store)
        .with_executor(executor)
        .with_clock(clock)
        .with_config(config)
        .build()
        .expect("app builds")
}

/// Poll until the job reaches `want`; panics after five seconds.
pub async fn wait_for_status(
    manager: &JobLifecycleManager,
    job_id: &str,
    want: JobStatus,
) -> JobStatusView {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let view = manager.get_status(job_id).await.expect("job exists");
        if view.status == want {
            return view;
        }
        assert!(
            Instant::now() < deadline,
            "job {job_id} is {}, expected {want}",
            view.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A job with a fixed id, moved to `status` with the given timestamps.
pub fn job_in(
    n: u64,
    kind: JobKind,
    status: JobStatus,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
) -> Job {
    let id = JobId::from_ulid(Ulid::from_parts(n, 0));
    let mut job = Job::new(id, kind, "seeded", created_at);
    match status {
        JobStatus::Pending => {}
        JobStatus::Processing => job.start(started_at).unwrap(),
        JobStatus::Completed => {
            job.start(started_at).unwrap();
            job.complete(started_at, "Export completed successfully", None)
                .unwrap();
        }
        JobStatus::Failed => {
            job.start(started_at).unwrap();
            job.fail(started_at, "Export failed").unwrap();
        }
        JobStatus::Cancelled => job.cancel(started_at, "Job cancelled by administrator").unwrap(),
    }
    job
}
