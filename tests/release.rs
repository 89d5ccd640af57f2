//! Hold resolution over simulated jobs.

mod common;

use std::sync::Arc;

use common::{AbortingPrompter, OperatorPrompter, UnreachablePrompter, activator};
use globus_condor::adapters::{MemoryJobStore, SimulatedTransferService};
use globus_condor::commands;
use globus_condor::config::AppConfig;
use globus_condor::context::AppContext;
use globus_condor::core::models::activation_key;
use globus_condor::core::{
    ActivationStatus, AttrValue, HoldResolver, InteractionMode, JobId, JobRecord, Prompter,
};
use globus_condor::error::AppError;

fn resolver(
    service: &Arc<SimulatedTransferService>,
    jobs: &Arc<MemoryJobStore>,
    prompter: Arc<dyn Prompter>,
) -> HoldResolver {
    HoldResolver::new(jobs.clone(), Ok(Arc::new(activator(service, jobs))), prompter)
}

fn held_job(jobs: &MemoryJobStore, id: JobId, pending: &[(u32, &str)]) {
    let mut record = JobRecord::new(id);
    for (idx, endpoint) in pending {
        record.set(activation_key(*idx), AttrValue::String(endpoint.to_string()));
    }
    jobs.insert(record);
    jobs.hold(id, "Job exited with code 11");
}

#[tokio::test]
async fn nothing_held_means_nothing_to_do() {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::new());
    jobs.insert(JobRecord::new(JobId::new(1, 0)));

    let report = resolver(&service, &jobs, Arc::new(UnreachablePrompter))
        .release_all()
        .await
        .unwrap();

    assert!(report.jobs.is_empty());
    assert!(jobs.releases().is_empty());
}

#[tokio::test]
async fn activated_endpoint_is_cleared_and_job_released() {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let id = JobId::new(10, 0);
    held_job(&jobs, id, &[(0, "ep-a")]);
    service.set_endpoint("ep-a", ActivationStatus::NeedsManual);

    let prompter = OperatorPrompter::new(&service, &["ep-a"], 1);
    let report = resolver(&service, &jobs, prompter.clone())
        .release_all()
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.jobs[0].resolved, vec!["ep-a".to_string()]);
    assert_eq!(prompter.acks(), 1);

    let record = jobs.job(id).unwrap();
    assert!(record.attribute(&activation_key(0)).is_undefined());
    assert!(record.pending_activations().is_empty());
    assert!(!record.is_held());
}

#[tokio::test]
async fn already_active_endpoint_needs_no_prompt() {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let id = JobId::new(11, 0);
    held_job(&jobs, id, &[(0, "ep-a"), (1, "ep-b")]);

    let report = resolver(&service, &jobs, Arc::new(UnreachablePrompter))
        .release_all()
        .await
        .unwrap();

    assert_eq!(report.released_count(), 1);
    assert_eq!(report.jobs[0].resolved.len(), 2);
    assert_eq!(jobs.releases(), vec![id]);
}

#[tokio::test]
async fn unresolvable_endpoint_still_releases_and_is_idempotent() {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let id = JobId::new(12, 0);
    held_job(&jobs, id, &[(0, "gone")]);
    service.remove_endpoint("gone");

    for run in 1..=2 {
        let report = resolver(&service, &jobs, Arc::new(UnreachablePrompter))
            .release_all()
            .await
            .unwrap();

        assert_eq!(report.jobs.len(), 1);
        let job = &report.jobs[0];
        assert!(job.released);
        assert!(job.resolved.is_empty());
        assert_eq!(job.unresolved.len(), 1);
        assert_eq!(job.unresolved[0].0, "gone");
        assert_eq!(jobs.releases().len(), run);

        // The job fails again on the same endpoint and goes back on hold.
        jobs.hold(id, "Job exited with code 11");
    }

    assert_eq!(
        jobs.job(id).unwrap().attribute(&activation_key(0)),
        &AttrValue::String("gone".into())
    );
    assert!(jobs.writes().is_empty());
}

#[tokio::test]
async fn failed_release_does_not_stop_the_sweep() {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let stuck = JobId::new(20, 0);
    let fine = JobId::new(21, 0);
    held_job(&jobs, stuck, &[]);
    held_job(&jobs, fine, &[]);
    jobs.fail_releases_of(stuck);

    let report = resolver(&service, &jobs, Arc::new(UnreachablePrompter))
        .release_all()
        .await
        .unwrap();

    assert_eq!(report.jobs.len(), 2);
    assert_eq!(report.jobs[0].job, stuck);
    assert!(!report.jobs[0].released);
    assert!(report.jobs[0].error.is_some());
    assert_eq!(report.jobs[1].job, fine);
    assert!(report.jobs[1].released);
    assert!(!report.is_clean());
    assert_eq!(jobs.releases(), vec![fine]);
}

#[tokio::test]
async fn operator_abort_ends_the_sweep() {
    let service = Arc::new(SimulatedTransferService::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let id = JobId::new(30, 0);
    held_job(&jobs, id, &[(0, "ep-a")]);
    service.set_endpoint("ep-a", ActivationStatus::NeedsManual);

    let err = resolver(&service, &jobs, Arc::new(AbortingPrompter))
        .release_all()
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert!(jobs.releases().is_empty());
    assert!(jobs.job(id).unwrap().is_held());
}

#[tokio::test]
async fn release_without_credential_still_releases_every_job() {
    let jobs = Arc::new(MemoryJobStore::new());
    let timed_out = JobId::new(9, 0);
    let waiting = JobId::new(10, 0);
    jobs.hold(timed_out, "Job exited with code 13");
    held_job(&jobs, waiting, &[(0, "ep-a")]);

    // No refresh token and no simulated service: building a transfer client fails.
    let ctx = AppContext::with_parts(
        AppConfig::default(),
        jobs.clone(),
        Arc::new(UnreachablePrompter),
        InteractionMode::Deferred { job: None },
    );
    let report = commands::release(&ctx).await.unwrap();

    assert_eq!(jobs.releases(), vec![timed_out, waiting]);
    assert!(!jobs.job(timed_out).unwrap().is_held());
    assert!(!jobs.job(waiting).unwrap().is_held());

    assert_eq!(report.jobs.len(), 2);
    assert!(report.jobs[0].unresolved.is_empty());
    let (endpoint, reason) = &report.jobs[1].unresolved[0];
    assert_eq!(endpoint, "ep-a");
    assert!(reason.contains("refresh token"), "{reason}");
    assert!(report.jobs[1].released);
    assert!(!report.is_clean());

    // The pending endpoint stays recorded for the next run.
    assert_eq!(
        jobs.job(waiting).unwrap().attribute(&activation_key(0)),
        &AttrValue::String("ep-a".into())
    );
}
