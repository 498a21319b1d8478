//! Reclaimer - stuck job の回収と retention purge
//!
//! # Stuck sweep
//! 1. PROCESSING の job を keyset paging で走査
//! 2. `now - stuck_threshold` より前に開始した job を timeout メッセージで
//!    FAILED に（まだ PROCESSING の場合のみ）
//!
//! # Retention purge
//! 1. `now - retention` より前に作成された job を走査
//! 2. COMPLETED / FAILED だけを残し、ページ単位で削除
//!
//! どちらも 1 回の呼び出しで 1 周。`start` がスケジュール通りに駆動する。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::gc_loop::GcLoop;
use crate::app::reaper_loop::ReaperLoop;
use crate::config::{ConfigError, PurgeSchedule, ReclaimerSettings, to_time_delta};
use crate::domain::{Job, JobId, JobStatus, StoreError};
use crate::ports::{Clock, JobStore, PageRequest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// PROCESSING jobs looked at.
    pub scanned: usize,
    pub timed_out: usize,
    /// Settled by someone else between the read and the conditional update.
    pub raced: usize,
    /// Conditional update returned an error; retried on the next sweep.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Jobs older than the retention window, any status.
    pub scanned: usize,
    pub purged: usize,
}

pub struct Reclaimer {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    settings: ReclaimerSettings,
    schedule: PurgeSchedule,
}

impl Reclaimer {
    pub fn new(
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        settings: ReclaimerSettings,
    ) -> Result<Self, ConfigError> {
        let schedule = settings.purge_schedule.parse()?;
        if settings.stuck_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reclaimer.stuck_sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(Self {
            store,
            clock,
            settings,
            schedule,
        })
    }

    pub fn settings(&self) -> &ReclaimerSettings {
        &self.settings
    }

    fn page(&self) -> PageRequest {
        PageRequest::first(self.settings.page_size)
    }

    /// Fail every PROCESSING job that has been running longer than the
    /// stuck threshold.
    pub async fn sweep_stuck(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let threshold = self.settings.stuck_threshold();
        let cutoff = before(now, threshold);
        let message = timeout_message(threshold);

        let mut report = SweepReport::default();
        let mut page = self.page();
        loop {
            let jobs = self.store.find_by_status(JobStatus::Processing, page).await?;
            let Some(last) = last_id(&jobs) else {
                break;
            };
            let full = jobs.len() >= page.limit;

            for mut job in jobs {
                report.scanned += 1;
                if !job.started_before(cutoff) {
                    continue;
                }
                tracing::warn!(job_id = %job.id, kind = %job.kind, started_at = ?job.started_at, "found stuck job, marking as FAILED");
                if job.fail(now, message.as_str()).is_err() {
                    continue;
                }
                match self.store.update_if_status(&job, JobStatus::Processing).await {
                    Ok(true) => report.timed_out += 1,
                    Ok(false) => {
                        tracing::debug!(job_id = %job.id, "stuck job settled concurrently, leaving it");
                        report.raced += 1;
                    }
                    Err(err) => {
                        tracing::error!(job_id = %job.id, error = %err, "failed to time out stuck job");
                        report.failed += 1;
                    }
                }
            }

            if !full {
                break;
            }
            page = page.next_after(last);
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            match self.store.count_by_status().await {
                Ok(counts) => tracing::debug!(?report, ?counts, "stuck sweep finished"),
                Err(err) => tracing::debug!(?report, error = %err, "stuck sweep finished, counts unavailable"),
            }
        }
        Ok(report)
    }

    /// Delete COMPLETED and FAILED jobs created before the retention window.
    pub async fn purge_expired(&self) -> Result<PurgeReport, StoreError> {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(self.settings.retention())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = PurgeReport::default();
        let mut page = self.page();
        loop {
            let jobs = self
                .store
                .find_by_created_between(DateTime::<Utc>::MIN_UTC, cutoff, page)
                .await?;
            let Some(last) = last_id(&jobs) else {
                break;
            };
            let full = jobs.len() >= page.limit;
            report.scanned += jobs.len();

            let expired: Vec<JobId> = jobs
                .iter()
                .filter(|job| job.status.is_purgeable())
                .map(|job| job.id)
                .collect();
            if !expired.is_empty() {
                tracing::info!("Purging {} old jobs", expired.len());
                report.purged += self.store.delete_all(&expired).await?;
            }

            if !full {
                break;
            }
            page = page.next_after(last);
        }

        tracing::debug!(?report, %cutoff, "retention purge finished");
        Ok(report)
    }

    /// Run both sweeps on their schedules until the handle is shut down.
    pub fn start(self: &Arc<Self>) -> ReclaimerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reaper = ReaperLoop::new(Arc::clone(self), self.settings.sweep_interval());
        let gc = GcLoop::new(Arc::clone(self), Arc::clone(&self.clock), self.schedule);

        let joins = vec![
            tokio::spawn(reaper.run(shutdown_rx.clone())),
            tokio::spawn(gc.run(shutdown_rx)),
        ];
        tracing::info!(
            sweep_interval = ?self.settings.sweep_interval(),
            schedule = ?self.schedule,
            "reclaimer started"
        );

        ReclaimerHandle { shutdown_tx, joins }
    }
}

/// Handle to the running reclaimer loops.
/// - `request_shutdown()` stops both loops after their current sweep
/// - `shutdown_and_join()` also waits for them
pub struct ReclaimerHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ReclaimerHandle {
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "reclaimer loop crashed");
            }
        }
        tracing::info!("reclaimer stopped");
    }
}

fn last_id(jobs: &[Job]) -> Option<JobId> {
    jobs.last().map(|job| job.id)
}

fn before(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(to_time_delta(by))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// "Job timed out after processing for more than 1 hour"
fn timeout_message(threshold: Duration) -> String {
    format!(
        "Job timed out after processing for more than {}",
        describe(threshold)
    )
}

fn describe(d: Duration) -> String {
    let secs = d.as_secs();
    let (n, unit) = if secs > 0 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs > 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
