//! SQLite job store.
//!
//! One connection behind a mutex; every call runs on the blocking pool via
//! `spawn_blocking`. Timestamps are stored as unix milliseconds, ids as the
//! bare 26-char ULID so that `ORDER BY id` is creation order.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::domain::{Job, JobId, JobKind, JobStatus, StoreError};
use crate::observability::JobCounts;
use crate::ports::{JobStore, PageRequest};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS integration_jobs (
    id              TEXT PRIMARY KEY,
    kind            TEXT NOT NULL,
    status          TEXT NOT NULL,
    request_summary TEXT NOT NULL,
    result_message  TEXT,
    result_data     TEXT,
    created_at      INTEGER NOT NULL,
    started_at      INTEGER,
    completed_at    INTEGER
);
CREATE INDEX IF NOT EXISTS idx_integration_jobs_status ON integration_jobs (status, id);
CREATE INDEX IF NOT EXISTS idx_integration_jobs_created_at ON integration_jobs (created_at);
"#;

const COLUMNS: &str = "id, kind, status, request_summary, result_message, result_data, created_at, started_at, completed_at";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection mutex poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("sqlite task failed: {e}")))?
    }

    /// `SELECT ... WHERE <filter> AND id > ? ORDER BY id LIMIT ?`
    async fn query_page(
        &self,
        filter: &'static str,
        mut args: Vec<Value>,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        args.push(Value::Text(
            page.after.map(|id| id.as_ulid().to_string()).unwrap_or_default(),
        ));
        args.push(Value::Integer(i64::try_from(page.limit).unwrap_or(i64::MAX)));

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM integration_jobs WHERE {filter} AND id > ? ORDER BY id LIMIT ?"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), JobRow::read)?;
            let mut jobs = Vec::new();
            for row in rows {
                jobs.push(row?.into_job()?);
            }
            Ok(jobs)
        })
        .await
    }
}

/// Raw column values, before parsing into domain types.
struct JobRow {
    id: String,
    kind: String,
    status: String,
    request_summary: String,
    result_message: Option<String>,
    result_data: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            status: row.get(2)?,
            request_summary: row.get(3)?,
            result_message: row.get(4)?,
            result_data: row.get(5)?,
            created_at: row.get(6)?,
            started_at: row.get(7)?,
            completed_at: row.get(8)?,
        })
    }

    fn into_job(self) -> Result<Job, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };
        let id: JobId = self.id.parse().map_err(|e| corrupt(format!("{e}")))?;
        let kind: JobKind = self.kind.parse().map_err(|e| corrupt(format!("{e}")))?;
        let status: JobStatus = self.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let created_at = from_millis(self.created_at)
            .ok_or_else(|| corrupt(format!("created_at out of range: {}", self.created_at)))?;
        let started_at = match self.started_at {
            Some(ms) => Some(
                from_millis(ms).ok_or_else(|| corrupt(format!("started_at out of range: {ms}")))?,
            ),
            None => None,
        };
        let completed_at = match self.completed_at {
            Some(ms) => Some(
                from_millis(ms)
                    .ok_or_else(|| corrupt(format!("completed_at out of range: {ms}")))?,
            ),
            None => None,
        };

        Ok(Job {
            id,
            kind,
            status,
            request_summary: self.request_summary,
            result_message: self.result_message,
            result_data: self.result_data,
            created_at,
            started_at,
            completed_at,
        })
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

fn key(id: JobId) -> String {
    id.as_ulid().to_string()
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let job = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO integration_jobs (id, kind, status, request_summary, result_message, result_data, created_at, started_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT (id) DO UPDATE SET
                    kind = excluded.kind,
                    status = excluded.status,
                    request_summary = excluded.request_summary,
                    result_message = excluded.result_message,
                    result_data = excluded.result_data,
                    created_at = excluded.created_at,
                    started_at = excluded.started_at,
                    completed_at = excluded.completed_at
                "#,
                params![
                    key(job.id),
                    job.kind.as_str(),
                    job.status.as_str(),
                    job.request_summary,
                    job.result_message,
                    job.result_data,
                    job.created_at.timestamp_millis(),
                    job.started_at.map(|t| t.timestamp_millis()),
                    job.completed_at.map(|t| t.timestamp_millis()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, StoreError> {
        let job = job.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE integration_jobs
                SET status = ?1, result_message = ?2, result_data = ?3, started_at = ?4, completed_at = ?5
                WHERE id = ?6 AND status = ?7
                "#,
                params![
                    job.status.as_str(),
                    job.result_message,
                    job.result_data,
                    job.started_at.map(|t| t.timestamp_millis()),
                    job.completed_at.map(|t| t.timestamp_millis()),
                    key(job.id),
                    expected.as_str(),
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM integration_jobs WHERE id = ?1");
            let row = conn
                .query_row(&sql, params![key(id)], JobRow::read)
                .optional()?;
            row.map(JobRow::into_job).transpose()
        })
        .await
    }

    async fn find_by_status(
        &self,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        self.query_page(
            "status = ?",
            vec![Value::Text(status.as_str().to_string())],
            page,
        )
        .await
    }

    async fn find_by_kind_and_status(
        &self,
        kind: JobKind,
        status: JobStatus,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        self.query_page(
            "kind = ? AND status = ?",
            vec![
                Value::Text(kind.as_str().to_string()),
                Value::Text(status.as_str().to_string()),
            ],
            page,
        )
        .await
    }

    async fn find_by_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: PageRequest,
    ) -> Result<Vec<Job>, StoreError> {
        self.query_page(
            "created_at >= ? AND created_at < ?",
            vec![
                Value::Integer(start.timestamp_millis()),
                Value::Integer(end.timestamp_millis()),
            ],
            page,
        )
        .await
    }

    async fn delete_all(&self, ids: &[JobId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = ids.iter().copied().map(key).collect();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM integration_jobs WHERE id = ?1")?;
                for key in &keys {
                    deleted += stmt.execute(params![key])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    async fn count_by_status(&self) -> Result<JobCounts, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT status, COUNT(*) FROM integration_jobs GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut counts = JobCounts::default();
            for row in rows {
                let (status, n) = row?;
                let status: JobStatus = status.parse().map_err(|e| StoreError::Corrupt {
                    id: "<count>".into(),
                    reason: format!("{e}"),
                })?;
                counts.add(status, usize::try_from(n).unwrap_or(0));
            }
            Ok(counts)
        })
        .await
    }
}
