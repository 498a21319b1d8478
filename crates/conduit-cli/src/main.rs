//! conduit CLI: inspect and maintain a SQLite job store, or run a demo.
//!
//! Logging: `RUST_LOG=conduit_core=debug` (default `conduit=info,conduit_core=info`)
//! on stderr; `--json-logs` for JSON lines.

mod cli;
mod demo;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use conduit_core::app::{App, AppBuilder};
use conduit_core::config::ConduitConfig;
use conduit_core::domain::{ExportRequest, FileImportRequest, ImportRequest};
use conduit_core::impls::SqliteJobStore;
use conduit_core::ports::{JobStore, PageRequest};

use crate::cli::{Cli, Command};
use crate::demo::SimulatedExecutor;

const DEFAULT_DB: &str = "conduit.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => ConduitConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConduitConfig::default(),
    };
    if let Some(db) = cli.db.clone() {
        config.store.sqlite_path = Some(db);
    }
    let db_path = config
        .store
        .sqlite_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::open(&db_path)
            .with_context(|| format!("opening job store {}", db_path.display()))?,
    );
    tracing::debug!(db = %db_path.display(), "job store opened");

    match cli.command {
        Command::Demo {
            failures,
            latency_ms,
        } => {
            let executor = Arc::new(SimulatedExecutor::new(
                failures,
                Duration::from_millis(latency_ms),
            ));
            let app = AppBuilder::new()
                .with_store(store)
                .with_executor(executor)
                .expect_executor()
                .with_config(config)
                .build()?;
            let result = run_demo(&app).await;
            app.shutdown().await;
            result?;
        }
        command => {
            // No executor: the pool stays closed and nothing is submitted.
            let app = AppBuilder::new().with_store(store).with_config(config).build()?;
            let result = run_admin(&app, command, &db_path).await;
            app.shutdown().await;
            result?;
        }
    }

    Ok(())
}

async fn run_admin(app: &App, command: Command, db_path: &Path) -> anyhow::Result<()> {
    match command {
        Command::Status { job_id } => {
            let view = app.manager.get_status(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::List {
            status,
            kind,
            limit,
        } => {
            let page = PageRequest::first(limit);
            let jobs = match kind {
                Some(kind) => app.manager.list_by_kind(kind, status, page).await?,
                None => app.manager.list(status, page).await?,
            };
            for job in &jobs {
                println!(
                    "{}  {:<11}  {:<10}  {}  {}",
                    job.id,
                    job.kind,
                    job.status,
                    job.created_at.to_rfc3339(),
                    job.result_message.as_deref().unwrap_or("-")
                );
            }
            if jobs.is_empty() {
                println!("no {status} jobs");
            }
        }
        Command::Counts => {
            let counts = app.manager.counts().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Command::Cancel { job_id } => {
            let view = app.manager.cancel(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Sweep => {
            let report = app.reclaimer.sweep_stuck().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Purge => {
            let report = app.reclaimer.purge_expired().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve => {
            let reclaimer = app.start_reclaimer();
            tracing::info!(db = %db_path.display(), "serving; Ctrl+C to stop");
            let signal = tokio::signal::ctrl_c().await.context("waiting for Ctrl+C");
            tracing::info!("shutting down");
            reclaimer.shutdown_and_join().await;
            signal?;
        }
        Command::Demo { .. } => anyhow::bail!("demo runs with a work executor"),
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("conduit=info,conduit_core=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn run_demo(app: &App) -> anyhow::Result<()> {
    let service = app.service()?;

    let receipts = vec![
        service
            .export(ExportRequest {
                entity_type: "customer".into(),
                entity_ids: vec!["c-1".into(), "c-2".into()],
                format: Some("json".into()),
                ..ExportRequest::default()
            })
            .await?,
        service
            .import(ImportRequest {
                entity_type: "invoice".into(),
                source_type: Some("erp".into()),
                ..ImportRequest::default()
            })
            .await?,
        service
            .import_file(FileImportRequest {
                file_name: "products.csv".into(),
                content_type: Some("text/csv".into()),
                content: b"sku,name\n1,widget\n".to_vec(),
                import_type: "product".into(),
            })
            .await?,
    ];

    for receipt in &receipts {
        println!("{}", serde_json::to_string(receipt)?);
    }

    for receipt in &receipts {
        let mut view = service.get_job_status(&receipt.job_id).await?;
        for _ in 0..100 {
            if view.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            view = service.get_job_status(&receipt.job_id).await?;
        }
        println!("{}", serde_json::to_string(&view)?);
    }
    Ok(())
}
