//! App - アプリケーション層
//!
//! ports を組み合わせて job のライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: 構築とワイヤリング（Fail-fast 検証）
//! - **JobLifecycleManager**: submit / execute / status / cancel
//! - **IntegrationService**: manager の上のリクエスト単位 API
//! - **WorkerPool**: core worker + burst worker の有界プール
//! - **Reclaimer**: stuck job の回収と保持期間切れの削除
//!   （**ReaperLoop** と **GcLoop** が定期実行）

pub mod builder;
pub mod gc_loop;
pub mod manager;
pub mod reaper_loop;
pub mod reclaimer;
pub mod retry;
pub mod service;
pub mod status;
pub mod worker_pool;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::gc_loop::GcLoop;
pub use self::manager::{CANCELLED_MESSAGE, JobLifecycleManager};
pub use self::reaper_loop::ReaperLoop;
pub use self::reclaimer::{PurgeReport, Reclaimer, ReclaimerHandle, SweepReport};
pub use self::retry::PersistRetryPolicy;
pub use self::service::{IntegrationService, SubmitReceipt};
pub use self::status::JobStatusView;
pub use self::worker_pool::{Dispatch, PoolError, PoolTask, WorkerPool};
