mod common;

use std::sync::Arc;

use rstest::rstest;

use conduit_core::app::CANCELLED_MESSAGE;
use conduit_core::domain::{
    ExportRequest, FileImportRequest, ImportRequest, JobError, JobId, JobKind, JobStatus,
};
use conduit_core::impls::{InMemoryJobStore, SqliteJobStore};
use conduit_core::ports::{JobStore, WorkItem};

use common::{Behavior, FlakyStore, ScriptedExecutor, build_app, config, wait_for_status};

fn export_request() -> ExportRequest {
    ExportRequest {
        entity_type: "customer".into(),
        entity_ids: vec!["42".into()],
        ..ExportRequest::default()
    }
}

fn import_request() -> ImportRequest {
    ImportRequest {
        entity_type: "invoice".into(),
        source_type: Some("erp".into()),
        ..ImportRequest::default()
    }
}

fn file_request(content: &[u8]) -> FileImportRequest {
    FileImportRequest {
        file_name: "products.csv".into(),
        content_type: Some("text/csv".into()),
        content: content.to_vec(),
        import_type: "product".into(),
    }
}

#[tokio::test]
async fn submitted_job_is_pending_until_a_worker_takes_it() {
    let (executor, gate) = ScriptedExecutor::gated(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));
    let service = app.service().unwrap();

    let first = service.export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &first.job_id, JobStatus::Processing).await;

    let second = service.export(export_request()).await.unwrap();
    assert_eq!(second.status, JobStatus::Pending);
    assert_eq!(second.message, "Export job created successfully");
    assert!(second.job_id.starts_with("job-"));

    let view = app.manager.get_status(&second.job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Pending);
    assert_eq!(view.message, None);
    assert_eq!(view.completed_at, None);

    gate.add_permits(2);
    wait_for_status(&app.manager, &first.job_id, JobStatus::Completed).await;
    wait_for_status(&app.manager, &second.job_id, JobStatus::Completed).await;
    app.shutdown().await;
}

#[tokio::test]
async fn successful_export_completes_with_timestamps_in_order() {
    let executor = ScriptedExecutor::new(Behavior::SucceedWith("2 rows"));
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(2, 4, 8));

    let receipt = app.service().unwrap().export(export_request()).await.unwrap();
    let view = wait_for_status(&app.manager, &receipt.job_id, JobStatus::Completed).await;
    assert_eq!(view.message.as_deref(), Some("Export completed successfully"));
    assert!(view.completed_at.is_some());

    let id: JobId = receipt.job_id.parse().unwrap();
    let job = app.manager.find_job(id).await.unwrap();
    let started = job.started_at.unwrap();
    let completed = job.completed_at.unwrap();
    assert!(job.created_at <= started);
    assert!(started <= completed);
    assert_eq!(job.result_data.as_deref(), Some("2 rows"));
    assert!(job.request_summary.contains("customer"));
    app.shutdown().await;
}

#[tokio::test]
async fn import_error_fails_the_job_with_the_error_text() {
    let executor = ScriptedExecutor::new(Behavior::Error("connection refused"));
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));

    let receipt = app.service().unwrap().import(import_request()).await.unwrap();
    assert_eq!(receipt.message, "Import job created successfully");

    let view = wait_for_status(&app.manager, &receipt.job_id, JobStatus::Failed).await;
    let message = view.message.unwrap();
    assert!(message.contains("connection refused"), "{message}");
    assert_eq!(message, "Import failed: connection refused");
    assert!(view.completed_at.is_some());
    app.shutdown().await;
}

#[rstest]
#[case(Behavior::Refuse, "File import failed")]
#[case(Behavior::RefuseWith("quota exceeded"), "File import failed: quota exceeded")]
#[case(Behavior::Succeed, "File import completed successfully")]
#[tokio::test]
async fn file_import_messages(#[case] behavior: Behavior, #[case] expected: &str) {
    let executor = ScriptedExecutor::new(behavior.clone());
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));

    let receipt = app
        .service()
        .unwrap()
        .import_file(file_request(b"sku\n1\n"))
        .await
        .unwrap();
    assert_eq!(receipt.message, "File import job created successfully");

    let want = if matches!(behavior, Behavior::Succeed) {
        JobStatus::Completed
    } else {
        JobStatus::Failed
    };
    let view = wait_for_status(&app.manager, &receipt.job_id, want).await;
    assert_eq!(view.message.as_deref(), Some(expected));
    app.shutdown().await;
}

#[tokio::test]
async fn empty_file_is_rejected_before_a_job_exists() {
    let store = Arc::new(InMemoryJobStore::new());
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(store.clone(), executor.clone(), config(1, 1, 4));

    let err = app
        .service()
        .unwrap()
        .import_file(file_request(b""))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidRequest(ref m) if m == "File is empty"));
    assert!(store.is_empty().await);
    assert_eq!(executor.calls(), 0);
    app.shutdown().await;
}

#[rstest]
#[case("job-01ARZ3NDEKTSV4RRFFQ69G5FAV")]
#[case("01ARZ3NDEKTSV4RRFFQ69G5FAV")]
#[case("not-a-job-id")]
#[case("")]
#[tokio::test]
async fn unknown_ids_are_not_found(#[case] job_id: &str) {
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));

    let err = app.manager.get_status(job_id).await.unwrap_err();
    match err {
        JobError::NotFound(id) => assert!(id.ends_with(job_id.trim_start_matches("job-"))),
        other => panic!("expected NotFound, got {other:?}"),
    }
    app.shutdown().await;
}

#[tokio::test]
async fn not_found_message_names_the_id() {
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));

    let err = app.manager.get_status("missing").await.unwrap_err();
    assert_eq!(err.to_string(), "Job not found with ID: missing");
    app.shutdown().await;
}

#[tokio::test]
async fn executor_panic_fails_the_job_and_keeps_the_pool_alive() {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let executor = ScriptedExecutor::new(Behavior::Panic);
    let app = build_app(Arc::clone(&store), executor, config(1, 1, 4));

    let receipt = app.service().unwrap().export(export_request()).await.unwrap();
    let view = wait_for_status(&app.manager, &receipt.job_id, JobStatus::Failed).await;
    let message = view.message.unwrap();
    assert!(message.starts_with("Export failed: executor panicked"), "{message}");

    // Same worker, a job that does not panic.
    let ok = app
        .manager
        .submit(
            JobKind::Import,
            "after panic",
            WorkItem::new(|| async { Ok(conduit_core::domain::WorkOutcome::success()) }),
        )
        .await
        .unwrap();
    wait_for_status(&app.manager, &ok.to_string(), JobStatus::Completed).await;
    app.shutdown().await;
}

#[tokio::test]
async fn storage_failure_on_submit_returns_no_id() {
    let store = Arc::new(FlakyStore::default());
    store.fail_next_saves(1);
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(store.clone(), executor.clone(), config(1, 1, 4));

    let err = app.service().unwrap().export(export_request()).await.unwrap_err();
    assert!(matches!(err, JobError::Storage(_)));
    assert_eq!(store.count_by_status().await.unwrap().total(), 0);
    assert_eq!(executor.calls(), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn mid_execution_write_failure_is_retried() {
    let store = Arc::new(FlakyStore::default());
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(store.clone(), executor, config(1, 1, 4));

    // Fails the PROCESSING write once; the retry lands it.
    store.fail_next_updates(1);
    let receipt = app.service().unwrap().export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &receipt.job_id, JobStatus::Completed).await;
    app.shutdown().await;
}

#[tokio::test]
async fn job_whose_start_cannot_be_recorded_ends_failed() {
    let store = Arc::new(FlakyStore::default());
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(store.clone(), executor.clone(), config(1, 1, 4));

    // Every retry of the PROCESSING write fails; the next write goes through.
    store.fail_next_updates(3);
    let receipt = app.service().unwrap().export(export_request()).await.unwrap();
    let view = wait_for_status(&app.manager, &receipt.job_id, JobStatus::Failed).await;
    assert_eq!(
        view.message.as_deref(),
        Some("Export failed: job store backend error: disk I/O error")
    );
    assert!(view.completed_at.is_some());
    assert_eq!(executor.calls(), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn full_pool_rejects_and_fails_the_job() {
    let (executor, gate) = ScriptedExecutor::gated(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 1));
    let service = app.service().unwrap();

    let running = service.export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &running.job_id, JobStatus::Processing).await;
    let queued = service.export(export_request()).await.unwrap();

    let err = service.export(export_request()).await.unwrap_err();
    let JobError::QueueFull { job_id } = err else {
        panic!("expected QueueFull, got {err:?}");
    };
    let rejected = app.manager.find_job(job_id).await.unwrap();
    assert_eq!(rejected.status, JobStatus::Failed);
    assert_eq!(
        rejected.result_message.as_deref(),
        Some("Export rejected: worker queue is full")
    );
    assert!(rejected.started_at.is_some());
    assert!(rejected.completed_at.is_some());

    gate.add_permits(2);
    wait_for_status(&app.manager, &running.job_id, JobStatus::Completed).await;
    wait_for_status(&app.manager, &queued.job_id, JobStatus::Completed).await;
    app.shutdown().await;
}

#[tokio::test]
async fn overflow_runs_on_a_burst_worker() {
    let (executor, gate) = ScriptedExecutor::gated(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 2, 1));
    let service = app.service().unwrap();

    let a = service.export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &a.job_id, JobStatus::Processing).await;
    let b = service.export(export_request()).await.unwrap();
    let c = service.export(export_request()).await.unwrap();

    // `a` holds the only core worker, so `c` can only be running on a burst one.
    wait_for_status(&app.manager, &c.job_id, JobStatus::Processing).await;
    assert!(service.export(export_request()).await.is_err());

    gate.add_permits(3);
    for id in [&a.job_id, &b.job_id, &c.job_id] {
        wait_for_status(&app.manager, id, JobStatus::Completed).await;
    }
    app.shutdown().await;
}

#[tokio::test]
async fn cancelled_pending_job_is_skipped_by_its_worker() {
    let (executor, gate) = ScriptedExecutor::gated(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor.clone(), config(1, 1, 4));
    let service = app.service().unwrap();

    let running = service.export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &running.job_id, JobStatus::Processing).await;
    let waiting = service.import(import_request()).await.unwrap();

    let view = app.manager.cancel(&waiting.job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert_eq!(view.message.as_deref(), Some(CANCELLED_MESSAGE));

    gate.add_permits(1);
    app.shutdown().await;

    let job = app.manager.find_job(waiting.job_id.parse().unwrap()).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn cancelled_running_job_keeps_its_cancellation() {
    let (executor, gate) = ScriptedExecutor::gated(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));

    let receipt = app.service().unwrap().export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &receipt.job_id, JobStatus::Processing).await;
    app.manager.cancel(&receipt.job_id).await.unwrap();

    gate.add_permits(1);
    app.shutdown().await;

    let view = app.manager.get_status(&receipt.job_id).await.unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert_eq!(view.message.as_deref(), Some(CANCELLED_MESSAGE));
}

#[tokio::test]
async fn cancelling_a_finished_job_is_an_invalid_transition() {
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));

    let receipt = app.service().unwrap().export(export_request()).await.unwrap();
    wait_for_status(&app.manager, &receipt.job_id, JobStatus::Completed).await;

    let err = app.manager.cancel(&receipt.job_id).await.unwrap_err();
    assert!(matches!(err, JobError::InvalidTransition(_)));
    app.shutdown().await;
}

#[tokio::test]
async fn submit_after_shutdown_is_refused() {
    let executor = ScriptedExecutor::new(Behavior::Succeed);
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(1, 1, 4));
    app.shutdown().await;

    let err = app.service().unwrap().export(export_request()).await.unwrap_err();
    let JobError::PoolClosed { job_id } = err else {
        panic!("expected PoolClosed, got {err:?}");
    };
    let job = app.manager.find_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn counts_and_listing_follow_the_store() {
    let executor = ScriptedExecutor::new(Behavior::Error("connection refused"));
    let app = build_app(Arc::new(InMemoryJobStore::new()), executor, config(2, 2, 8));
    let service = app.service().unwrap();

    let a = service.export(export_request()).await.unwrap();
    let b = service.import(import_request()).await.unwrap();
    wait_for_status(&app.manager, &a.job_id, JobStatus::Failed).await;
    wait_for_status(&app.manager, &b.job_id, JobStatus::Failed).await;

    let counts = app.manager.counts().await.unwrap();
    assert_eq!(counts.failed, 2);
    assert_eq!(counts.total(), 2);

    let failed_imports = app
        .manager
        .list_by_kind(JobKind::Import, JobStatus::Failed, Default::default())
        .await
        .unwrap();
    assert_eq!(failed_imports.len(), 1);
    assert_eq!(failed_imports[0].id.to_string(), b.job_id);
    app.shutdown().await;
}

#[tokio::test]
async fn sqlite_store_keeps_finished_jobs_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.db");

    let job_id = {
        let store = Arc::new(SqliteJobStore::open(&path).unwrap());
        let executor = ScriptedExecutor::new(Behavior::Succeed);
        let app = build_app(store, executor, config(1, 1, 4));
        let receipt = app.service().unwrap().export(export_request()).await.unwrap();
        wait_for_status(&app.manager, &receipt.job_id, JobStatus::Completed).await;
        app.shutdown().await;
        receipt.job_id
    };

    let store = SqliteJobStore::open(&path).unwrap();
    let job = store.find_by_id(job_id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_message.as_deref(), Some("Export completed successfully"));
}
