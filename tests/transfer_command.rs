mod common;

use std::sync::Arc;
use std::time::Duration;

use common::UnreachablePrompter;
use globus_condor::adapters::{MemoryJobStore, SimulatedPoll, SimulatedTransferService};
use globus_condor::commands::{self, TransferOptions};
use globus_condor::config::AppConfig;
use globus_condor::context::AppContext;
use globus_condor::core::{ActivationStatus, InteractionMode, JobId, SyncLevel, WaitPolicy};
use globus_condor::error::{AppError, EXIT_CODE_INVALID_TRANSFER_SPECIFICATION};

struct Harness {
    service: Arc<SimulatedTransferService>,
    jobs: Arc<MemoryJobStore>,
    ctx: AppContext,
}

fn harness(config: AppConfig, mode: InteractionMode) -> Harness {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::running_as(JobId::new(77, 0)));
    let ctx = AppContext::with_parts(config, jobs.clone(), Arc::new(UnreachablePrompter), mode)
        .with_transfer(service.clone());
    Harness { service, jobs, ctx }
}

fn blocking() -> InteractionMode {
    InteractionMode::Blocking(Arc::new(UnreachablePrompter))
}

fn options(specs: &[&str]) -> TransferOptions {
    TransferOptions {
        source_endpoint: "src".to_string(),
        destination_endpoint: "dst".to_string(),
        specs: specs.iter().map(|s| s.to_string()).collect(),
        label: None,
        sync_level: SyncLevel::default(),
        preserve_timestamps: true,
        verify_checksums: true,
        wait: None,
    }
}

#[tokio::test]
async fn mixed_spec_is_rejected_before_contacting_the_service() {
    let h = harness(AppConfig::default(), blocking());

    let err = commands::transfer(&h.ctx, options(&["/a/:/b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidTransferSpecification { ref spec } if spec == "/a/:/b"));
    assert_eq!(err.exit_code(), EXIT_CODE_INVALID_TRANSFER_SPECIFICATION);
    let calls = h.service.calls();
    assert_eq!(calls.get_endpoint, 0);
    assert_eq!(calls.submit_transfer, 0);
}

#[tokio::test]
async fn one_bad_spec_rejects_the_whole_transfer() {
    let h = harness(AppConfig::default(), blocking());

    let err = commands::transfer(&h.ctx, options(&["/a:/b", "/c:/d/"]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidTransferSpecification { .. }));
    assert_eq!(h.service.calls().submit_transfer, 0);
}

#[tokio::test]
async fn files_and_directories_are_submitted_in_order() {
    let h = harness(AppConfig::default(), blocking());

    let mut opts = options(&["/a/:/b/", "/a:/b"]);
    opts.label = Some("nightly".to_string());
    opts.sync_level = SyncLevel::Size;
    opts.verify_checksums = false;
    let task_id = commands::transfer(&h.ctx, opts).await.unwrap();

    assert!(!task_id.is_empty());
    let submitted = h.service.submitted();
    assert_eq!(submitted.len(), 1);
    let request = &submitted[0];
    assert_eq!(request.source_endpoint, "src");
    assert_eq!(request.destination_endpoint, "dst");
    assert_eq!(request.label.as_deref(), Some("nightly"));
    assert_eq!(request.sync_level, SyncLevel::Size);
    assert!(request.preserve_timestamps);
    assert!(!request.verify_checksums);
    assert_eq!(request.items.len(), 2);
    assert!(request.items[0].recursive);
    assert!(!request.items[1].recursive);
    assert_eq!(request.items[1].source_path, "/a");
}

#[tokio::test]
async fn bookmarks_resolve_to_endpoint_ids() {
    let mut config = AppConfig::default();
    config
        .bookmarks
        .insert("home".to_string(), "ep-home".to_string());
    let h = harness(config, blocking());

    let mut opts = options(&["/x:/y"]);
    opts.source_endpoint = "home".to_string();
    commands::transfer(&h.ctx, opts).await.unwrap();

    assert_eq!(h.service.submitted()[0].source_endpoint, "ep-home");
}

#[tokio::test]
async fn unattended_transfer_records_endpoints_and_fails() {
    let job = JobId::new(77, 0);
    let h = harness(AppConfig::default(), InteractionMode::Deferred { job: Some(job) });
    h.service.set_endpoint("dst", ActivationStatus::NeedsManual);

    let err = commands::transfer(&h.ctx, options(&["/a:/b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Activation { ref endpoints } if endpoints == &["dst"]));
    assert_eq!(h.service.calls().submit_transfer, 0);
    let pending = h.jobs.job(job).unwrap().pending_activations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].1, "dst");
}

#[tokio::test]
async fn transfer_can_wait_for_completion() {
    let h = harness(AppConfig::default(), blocking());
    h.service
        .script_polls([SimulatedPoll::NotDone, SimulatedPoll::Done]);

    let mut opts = options(&["/a:/b"]);
    opts.wait = Some(WaitPolicy {
        timeout: Duration::from_millis(10),
        interval: Duration::from_millis(1),
        max_attempts: 2,
    });
    commands::transfer(&h.ctx, opts).await.unwrap();

    assert_eq!(h.service.calls().poll_task, 2);
}

#[tokio::test]
async fn pending_task_can_be_cancelled_once() {
    let h = harness(AppConfig::default(), blocking());
    let task_id = commands::transfer(&h.ctx, options(&["/a:/b"])).await.unwrap();

    commands::cancel(&h.ctx, &task_id).await.unwrap();

    let err = commands::cancel(&h.ctx, &task_id).await.unwrap_err();
    assert!(matches!(err, AppError::CancelTask { .. }));
}

#[tokio::test]
async fn cancelling_an_unknown_task_fails() {
    let h = harness(AppConfig::default(), blocking());

    let err = commands::cancel(&h.ctx, "no-such-task").await.unwrap_err();

    assert!(matches!(err, AppError::CancelTask { ref task_id, .. } if task_id == "no-such-task"));
}

#[tokio::test]
async fn endpoint_info_is_json() {
    let h = harness(AppConfig::default(), blocking());

    let text = commands::endpoint_info(&h.ctx, "ep").await.unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["id"], "sim-ep");
}
