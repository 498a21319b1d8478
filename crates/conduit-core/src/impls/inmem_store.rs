//! In-memory job store.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Job, JobId, JobKind, JobStatus, StoreError};
use crate::observability::JobCounts;
use crate::ports::{JobStore, PageRequest};

/// Map-backed `JobStore`.
///
/// Design:
/// - A `BTreeMap` keyed by id gives id-ordered scans for keyset paging.
/// - Every operation takes the lock once and releases it before returning;
///   no lock is held across an await outside this type.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn scan<F>(&self, page: PageRequest, keep: F) -> Vec<Job>
    where
        F: Fn(&Job) -> bool,
    {
        let jobs = self.jobs.read().await;
        let lower = match page.after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        jobs.range((lower, Bound::Unbounded))
            .map(|(_, job)| job)
            .filter(|job| keep(job))
            .take(page.limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(current) if current.status == expected => {
                *current = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        Ok(self.scan(page, |job| job.status == status).await)
    }

    async fn find_by_kind_and_status(
        &self,
        kind: JobKind,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .scan(page, |job| job.kind == kind && job.status == status)
            .await)
    }

    async fn find_by_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .scan(page, |job| job.created_at >= start && job.created_at < end)
            .await)
    }

    async fn delete_all(&self, ids: &[JobId]) -> Result<usize, StoreError> {
        let mut jobs = self.jobs.write().await;
        Ok(ids.iter().filter(|id| jobs.remove(*id).is_some()).count())
    }

    async fn count_by_status(&self) -> Result<JobCounts, StoreError> {
        let jobs = self.jobs.read().await;
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }
}
