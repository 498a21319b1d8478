//! Impls - `JobStore` の実装
//!
//! - **InMemoryJobStore**: テスト・デモ用
//! - **SqliteJobStore**: 単一ファイルで永続化

pub mod inmem_store;
pub mod sqlite_store;

pub use self::inmem_store::InMemoryJobStore;
pub use self::sqlite_store::SqliteJobStore;
