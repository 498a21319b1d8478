//! Runtime configuration.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! pool:
//!   core_workers: 5
//!   max_workers: 10
//!   queue_capacity: 25
//! reclaimer:
//!   stuck_threshold_secs: 3600
//!   stuck_sweep_interval_secs: 300
//!   retention_days: 30
//!   purge_schedule:
//!     daily_at: "00:00"
//!   page_size: 500
//! persistence:
//!   max_attempts: 3
//!   base_delay_ms: 200
//!   multiplier: 2.0
//! store:
//!   sqlite_path: ./conduit.db
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::PersistRetryPolicy;
use crate::ports::DEFAULT_PAGE_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub pool: PoolSettings,
    pub reclaimer: ReclaimerSettings,
    pub persistence: PersistenceSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Long-lived workers draining the queue.
    pub core_workers: usize,
    /// Upper bound on concurrent executions, core workers included.
    pub max_workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            core_workers: 5,
            max_workers: 10,
            queue_capacity: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimerSettings {
    pub stuck_threshold_secs: u64,
    pub stuck_sweep_interval_secs: u64,
    pub retention_days: u32,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub purge_schedule: PurgeScheduleSettings,
    pub page_size: usize,
}

impl Default for ReclaimerSettings {
    fn default() -> Self {
        Self {
            stuck_threshold_secs: 3600,
            stuck_sweep_interval_secs: 300,
            retention_days: 30,
            purge_schedule: PurgeScheduleSettings::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ReclaimerSettings {
    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stuck_sweep_interval_secs)
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.retention_days))
    }
}

/// When the retention purge runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeScheduleSettings {
    /// Wall-clock time of day, UTC, "HH:MM".
    DailyAt(String),
    EverySecs(u64),
}

impl Default for PurgeScheduleSettings {
    fn default() -> Self {
        Self::DailyAt("00:00".to_string())
    }
}

impl PurgeScheduleSettings {
    pub fn parse(&self) -> Result<PurgeSchedule, ConfigError> {
        match self {
            Self::DailyAt(raw) => NaiveTime::parse_from_str(raw, "%H:%M")
                .map(PurgeSchedule::DailyAt)
                .map_err(|e| ConfigError::Invalid(format!("purge_schedule.daily_at {raw:?}: {e}"))),
            Self::EverySecs(0) => Err(ConfigError::Invalid(
                "purge_schedule.every_secs must be positive".into(),
            )),
            Self::EverySecs(secs) => Ok(PurgeSchedule::Every(Duration::from_secs(*secs))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeSchedule {
    DailyAt(NaiveTime),
    Every(Duration),
}

impl PurgeSchedule {
    /// The first run strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::DailyAt(at) => {
                let today = now.date_naive().and_time(at).and_utc();
                if today > now {
                    today
                } else {
                    today + TimeDelta::days(1)
                }
            }
            Self::Every(every) => now + to_time_delta(every),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            multiplier: 2.0,
        }
    }
}

impl PersistenceSettings {
    pub fn retry_policy(&self) -> PersistRetryPolicy {
        PersistRetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite database file. The CLI falls back to `./conduit.db` when unset.
    pub sqlite_path: Option<PathBuf>,
}

impl ConduitConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document; treat it as all defaults.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.pool;
        if pool.core_workers == 0 {
            return Err(ConfigError::Invalid("pool.core_workers must be at least 1".into()));
        }
        if pool.max_workers < pool.core_workers {
            return Err(ConfigError::Invalid(format!(
                "pool.max_workers ({}) is below pool.core_workers ({})",
                pool.max_workers, pool.core_workers
            )));
        }
        if pool.queue_capacity == 0 {
            return Err(ConfigError::Invalid("pool.queue_capacity must be at least 1".into()));
        }

        let reclaimer = &self.reclaimer;
        if reclaimer.stuck_threshold_secs == 0 {
            return Err(ConfigError::Invalid(
                "reclaimer.stuck_threshold_secs must be positive".into(),
            ));
        }
        if reclaimer.stuck_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reclaimer.stuck_sweep_interval_secs must be positive".into(),
            ));
        }
        if reclaimer.retention_days == 0 {
            return Err(ConfigError::Invalid("reclaimer.retention_days must be positive".into()));
        }
        if reclaimer.page_size == 0 {
            return Err(ConfigError::Invalid("reclaimer.page_size must be at least 1".into()));
        }
        reclaimer.purge_schedule.parse()?;

        let persistence = &self.persistence;
        // At least one retry after the first write.
        if persistence.max_attempts < 2 {
            return Err(ConfigError::Invalid(
                "persistence.max_attempts must be at least 2".into(),
            ));
        }
        if !(persistence.multiplier.is_finite() && persistence.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "persistence.multiplier must be a finite number >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// `Duration` to `TimeDelta`, saturating at `TimeDelta::MAX`.
pub fn to_time_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}
