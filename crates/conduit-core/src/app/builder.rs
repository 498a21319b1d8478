//! AppBuilder - 構築とワイヤリング
//!
//! # 学習ポイント
//! - 起動時検証（Fail-fast）: store 不足・executor 不足・不正な設定
//! - executor なしなら worker pool を起動しない（参照・sweep 専用）
//!
//! ```ignore
//! let app = AppBuilder::new()
//!     .with_store(Arc::new(InMemoryJobStore::new()))
//!     .with_executor(Arc::new(MyPartnerClient::new()))
//!     .with_config(config)
//!     .build()?;
//! let reclaimer = app.start_reclaimer();
//! let receipt = app.service()?.export(request).await?;
//! ```

use std::sync::Arc;

use crate::app::manager::JobLifecycleManager;
use crate::app::reclaimer::{Reclaimer, ReclaimerHandle};
use crate::app::service::IntegrationService;
use crate::app::worker_pool::WorkerPool;
use crate::config::{ConduitConfig, ConfigError};
use crate::domain::JobError;
use crate::ports::{Clock, IdGenerator, JobStore, SystemClock, UlidGenerator, WorkExecutor};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no job store configured")]
    MissingStore,

    #[error("a work executor was expected but none was configured")]
    MissingExecutor,

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Default)]
pub struct AppBuilder {
    store: Option<Arc<dyn JobStore>>,
    executor: Option<Arc<dyn WorkExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: ConduitConfig,
    executor_expected: bool,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn WorkExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a `UlidGenerator` on the configured clock.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_config(mut self, config: ConduitConfig) -> Self {
        self.config = config;
        self
    }

    /// Make `build()` fail when no executor was given.
    ///
    /// Tools that only read or sweep jobs (the CLI's `status`, `sweep`, ...)
    /// build without one.
    pub fn expect_executor(mut self) -> Self {
        self.executor_expected = true;
        self
    }

    /// Validate and wire everything. With an executor this starts the worker
    /// pool, so it must run inside a tokio runtime; without one the pool is
    /// closed and `submit` is refused.
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        if self.executor_expected && self.executor.is_none() {
            return Err(BuildError::MissingExecutor);
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let reclaimer = Reclaimer::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            self.config.reclaimer.clone(),
        )?;

        let pool = match self.executor {
            Some(_) => WorkerPool::start(&self.config.pool),
            None => WorkerPool::closed(),
        };
        let manager = Arc::new(JobLifecycleManager::new(
            store,
            clock,
            ids,
            pool,
            self.config.persistence.retry_policy(),
        ));
        let service = self
            .executor
            .map(|executor| IntegrationService::new(Arc::clone(&manager), executor));

        Ok(App {
            manager,
            service,
            reclaimer: Arc::new(reclaimer),
        })
    }
}

pub struct App {
    pub manager: Arc<JobLifecycleManager>,
    pub service: Option<IntegrationService>,
    pub reclaimer: Arc<Reclaimer>,
}

impl App {
    /// The request-level API; only there when an executor was configured.
    pub fn service(&self) -> Result<&IntegrationService, JobError> {
        self.service
            .as_ref()
            .ok_or_else(|| JobError::InvalidRequest("no work executor configured".into()))
    }

    pub fn start_reclaimer(&self) -> ReclaimerHandle {
        self.reclaimer.start()
    }

    /// Drain the worker pool. Reclaimer loops are stopped through their
    /// handle.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
