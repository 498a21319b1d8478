//! GcLoop - 保持期間切れ job の定期削除
//!
//! # フロー
//! 1. 注入された clock から次回実行時刻を計算して sleep
//! 2. `Reclaimer::purge_expired()`
//! 3. shutdown シグナルで終了

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::app::reclaimer::Reclaimer;
use crate::config::PurgeSchedule;
use crate::ports::Clock;

pub struct GcLoop {
    reclaimer: Arc<Reclaimer>,
    clock: Arc<dyn Clock>,
    schedule: PurgeSchedule,
}

impl GcLoop {
    pub fn new(reclaimer: Arc<Reclaimer>, clock: Arc<dyn Clock>, schedule: PurgeSchedule) -> Self {
        Self {
            reclaimer,
            clock,
            schedule,
        }
    }

    /// Time left until the next scheduled purge.
    fn until_next(&self) -> Duration {
        let now = self.clock.now();
        (self.schedule.next_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let wait = self.until_next();
            tracing::debug!(?wait, "next retention purge scheduled");
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.reclaimer.purge_expired().await {
                Ok(report) => tracing::info!(purged = report.purged, scanned = report.scanned, "retention purge done"),
                Err(err) => tracing::error!(error = %err, "retention purge failed"),
            }
        }
        tracing::debug!("gc loop stopped");
    }
}
