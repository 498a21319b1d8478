//! conduit-core
//!
//! パートナーシステム向け integration job（export / import / file import）の
//! 非同期ライフサイクル管理。
//!
//! # モジュール構成
//! - **domain**: job, status, request, outcome, error
//! - **ports**: JobStore, WorkExecutor, Clock, IdGenerator
//! - **impls**: in-memory / SQLite の JobStore
//! - **app**: manager, worker pool, reclaimer, builder
//! - **config**: YAML 設定
//! - **observability**: status 別の件数

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
