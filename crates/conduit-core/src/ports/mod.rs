//! Ports - 外部システムとの境界
//!
//! 各 trait が 1 つの協力者（永続化エンジン、パートナーシステム、時刻、
//! id 生成）を interface の裏に隠す。core はこの interface に対して書かれる。

pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod work_executor;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{DEFAULT_PAGE_SIZE, JobStore, PageRequest};
pub use self::work_executor::{WorkExecutor, WorkFuture, WorkItem};
