//! Retry around job-record writes made from inside a worker.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff for store writes.
///
/// Only the worker's mid-execution writes go through this; the initial save
/// in `submit` surfaces its error to the caller instead.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistRetryPolicy {
    /// Total tries, the first one included.
    pub max_attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    pub multiplier: f64,
}

impl Default for PersistRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl PersistRetryPolicy {
    /// Delay after the `attempts`-th failure (1-indexed):
    /// `base_delay * multiplier^(attempts - 1)`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exp = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds or `max_attempts` is spent; returns the
    /// last error.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    tracing::error!(what, attempt, error = %err, "giving up");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.next_delay(attempt);
                    tracing::warn!(what, attempt, ?delay, error = %err, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
