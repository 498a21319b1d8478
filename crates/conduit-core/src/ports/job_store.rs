//! JobStore port - job レコードの唯一の正
//!
//! コンポーネント間のやり取りは store 経由のみ。job レコードをまたいで
//! プロセス内ロックを保持することはない。
//!
//! # 実装
//! - `InMemoryJobStore`（テスト、デモ）
//! - `SqliteJobStore`（永続）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Job, JobId, JobKind, JobStatus, StoreError};
use crate::observability::JobCounts;

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Keyset page over jobs ordered by id.
///
/// Ids are ULIDs, so id order is creation order. Paging by "ids after the last
/// one seen" stays correct while the caller updates or deletes rows of the
/// page it just read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<JobId>,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            after: None,
            limit: limit.max(1),
        }
    }

    pub fn next_after(self, last: JobId) -> Self {
        Self {
            after: Some(last),
            ..self
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Durable keyed storage for jobs.
///
/// # Contract
/// - Query results are ordered by id ascending and contain only ids strictly
///   greater than `page.after`.
/// - `update_if_status` is the only write the lifecycle uses after creation:
///   it stores `job` only if the stored status still equals `expected`, and
///   reports whether it did. This is what keeps a late worker from
///   overwriting a job the reclaimer already failed (and vice versa).
/// - `find_by_created_between` is half-open: `start <= created_at < end`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace by id.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    async fn find_by_status(
        &self,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError>;

    async fn find_by_kind_and_status(
        &self,
        kind: JobKind,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError>;

    async fn find_by_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError>;

    /// Delete the given ids; unknown ids are ignored. Returns rows deleted.
    async fn delete_all(&self, ids: &[JobId]) -> Result<usize, StoreError>;

    async fn count_by_status(&self) -> Result<JobCounts, StoreError>;
}
