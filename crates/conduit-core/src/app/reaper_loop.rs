//! ReaperLoop - stuck job の定期回収
//!
//! # フロー
//! 1. `interval` ごとに tick（最初の tick は即時）
//! 2. `Reclaimer::sweep_stuck()`
//! 3. shutdown フラグが立つか sender が drop されたら終了

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::app::reclaimer::Reclaimer;

pub struct ReaperLoop {
    reclaimer: Arc<Reclaimer>,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(reclaimer: Arc<Reclaimer>, interval: Duration) -> Self {
        Self {
            reclaimer,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // A slow sweep pushes the next one back instead of bunching them up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.reclaimer.sweep_stuck().await {
                Ok(report) if report.timed_out > 0 => {
                    tracing::info!(timed_out = report.timed_out, raced = report.raced, "stuck jobs failed");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "stuck sweep failed"),
            }
        }
        tracing::debug!("reaper loop stopped");
    }
}
