//! In-process transfer service and job store.
//!
//! Backs `--simulation` runs and the test suite. Both can be scripted: the
//! transfer service holds per-endpoint activation state and a queue of poll
//! outcomes, the job store holds job records in memory.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::core::job_store::JobStore;
use crate::core::models::{
    ActivationStatus, AttrValue, AutoActivation, CancelOutcome, DirEntry, Endpoint, JobId,
    JobRecord, JobStatus, PollOutcome, Task, TaskState, TransferRequest,
};
use crate::core::transfer_service::TransferService;
use crate::error::TransferError;

/// Scripted result of one `poll_task` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedPoll {
    Done,
    NotDone,
    TransientError,
}

/// Number of calls made to each transfer service operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub get_endpoint: usize,
    pub autoactivate: usize,
    pub submit_transfer: usize,
    pub poll_task: usize,
    pub cancel_task: usize,
    pub list_directory: usize,
}

#[derive(Default)]
struct ServiceState {
    endpoints: HashMap<String, ActivationStatus>,
    missing: Vec<String>,
    polls: VecDeque<SimulatedPoll>,
    tasks: HashMap<String, TaskState>,
    /// Task ids in submission order, parallel to `submitted`.
    task_ids: Vec<String>,
    submitted: Vec<TransferRequest>,
    directories: HashMap<(String, String), Vec<DirEntry>>,
    calls: CallCounts,
}

/// Transfer service fake. Endpoints it has not been told about are active.
#[derive(Default)]
pub struct SimulatedTransferService {
    state: Mutex<ServiceState>,
}

impl SimulatedTransferService {
    pub fn new() -> Self {
        Self::default()
    }

    /// `AutoActivatable` endpoints accept automatic activation, `NeedsManual`
    /// ones reject it until [`Self::activate`] is called.
    pub fn set_endpoint(&self, endpoint_id: &str, status: ActivationStatus) {
        let mut state = self.lock();
        state.missing.retain(|id| id != endpoint_id);
        state.endpoints.insert(endpoint_id.to_string(), status);
    }

    /// Manual activation performed out of band.
    pub fn activate(&self, endpoint_id: &str) {
        self.set_endpoint(endpoint_id, ActivationStatus::Active);
    }

    /// Make lookups of `endpoint_id` fail as if it had been deleted.
    pub fn remove_endpoint(&self, endpoint_id: &str) {
        let mut state = self.lock();
        state.endpoints.remove(endpoint_id);
        state.missing.push(endpoint_id.to_string());
    }

    /// Queue poll outcomes; once the queue is empty polls report `Done`.
    pub fn script_polls(&self, polls: impl IntoIterator<Item = SimulatedPoll>) {
        self.lock().polls.extend(polls);
    }

    /// Contents returned when listing `path` on `endpoint_id`.
    pub fn set_directory(&self, endpoint_id: &str, path: &str, entries: Vec<DirEntry>) {
        self.lock()
            .directories
            .insert((endpoint_id.to_string(), path.to_string()), entries);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn submitted(&self) -> Vec<TransferRequest> {
        self.lock().submitted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TransferService for SimulatedTransferService {
    async fn get_endpoint(&self, endpoint_id: &str) -> Result<Endpoint, TransferError> {
        let mut state = self.lock();
        state.calls.get_endpoint += 1;

        if state.missing.iter().any(|id| id == endpoint_id) {
            return Err(TransferError::Api {
                status: 404,
                code: "EndpointNotFound".to_string(),
                message: format!("No such endpoint {endpoint_id}"),
            });
        }

        let status = state
            .endpoints
            .get(endpoint_id)
            .copied()
            .unwrap_or(ActivationStatus::Active);

        Ok(Endpoint {
            id: endpoint_id.to_string(),
            internal_id: format!("sim-{endpoint_id}"),
            display_name: Some(format!("Simulated {endpoint_id}")),
            status,
            expires_in: (status == ActivationStatus::Active).then(|| Duration::from_secs(86_400)),
            raw: json!({
                "id": format!("sim-{endpoint_id}"),
                "activated": status == ActivationStatus::Active,
            }),
        })
    }

    async fn autoactivate(&self, endpoint_id: &str) -> Result<AutoActivation, TransferError> {
        let mut state = self.lock();
        state.calls.autoactivate += 1;

        match state.endpoints.get(endpoint_id).copied() {
            Some(ActivationStatus::NeedsManual) => Ok(AutoActivation::Rejected),
            _ => {
                state
                    .endpoints
                    .insert(endpoint_id.to_string(), ActivationStatus::Active);
                Ok(AutoActivation::Activated)
            }
        }
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String, TransferError> {
        let mut state = self.lock();
        state.calls.submit_transfer += 1;

        let task_id = Uuid::now_v7().to_string();
        state.submitted.push(request.clone());
        state.task_ids.push(task_id.clone());
        state.tasks.insert(task_id.clone(), TaskState::Pending);
        debug!(task_id = %task_id, items = request.items.len(), "Simulated transfer submitted");
        Ok(task_id)
    }

    async fn poll_task(
        &self,
        task_id: &str,
        _timeout: Duration,
        _interval: Duration,
    ) -> Result<PollOutcome, TransferError> {
        let mut state = self.lock();
        state.calls.poll_task += 1;

        match state.polls.pop_front().unwrap_or(SimulatedPoll::Done) {
            SimulatedPoll::Done => {
                state
                    .tasks
                    .insert(task_id.to_string(), TaskState::Succeeded);
                Ok(PollOutcome::Done)
            }
            SimulatedPoll::NotDone => Ok(PollOutcome::NotDone),
            SimulatedPoll::TransientError => Err(TransferError::Transport(
                "simulated connection reset".to_string(),
            )),
        }
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, TransferError> {
        let state = self.lock();
        let task_state = state
            .tasks
            .get(task_id)
            .copied()
            .unwrap_or(TaskState::Succeeded);
        Ok(Task::new(task_id, task_state))
    }

    async fn cancel_task(&self, task_id: &str) -> Result<CancelOutcome, TransferError> {
        let mut state = self.lock();
        state.calls.cancel_task += 1;

        match state.tasks.get(task_id).copied() {
            Some(TaskState::Pending) => {
                state
                    .tasks
                    .insert(task_id.to_string(), TaskState::Failed);
                Ok(CancelOutcome::Canceled)
            }
            Some(_) => Ok(CancelOutcome::NotCanceled {
                code: "TaskComplete".to_string(),
                message: format!("Task {task_id} is already complete"),
            }),
            None => Err(TransferError::Api {
                status: 404,
                code: "TaskNotFound".to_string(),
                message: format!("No such task {task_id}"),
            }),
        }
    }

    async fn list_directory(
        &self,
        endpoint_id: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferError> {
        let mut state = self.lock();
        state.calls.list_directory += 1;

        if matches!(state.endpoints.get(endpoint_id), Some(status) if *status != ActivationStatus::Active)
        {
            return Err(TransferError::Api {
                status: 409,
                code: "ClientError.ActivationRequired".to_string(),
                message: format!("Endpoint {endpoint_id} is not activated"),
            });
        }

        Ok(state
            .directories
            .get(&(endpoint_id.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_tasks(&self, limit: usize) -> Result<Vec<Task>, TransferError> {
        let state = self.lock();
        Ok(state
            .task_ids
            .iter()
            .zip(&state.submitted)
            .rev()
            .take(limit)
            .map(|(id, request)| {
                let task_state = state.tasks.get(id).copied().unwrap_or(TaskState::Pending);
                Task {
                    label: request.label.clone(),
                    source: Some(format!("Simulated {}", request.source_endpoint)),
                    destination: Some(format!("Simulated {}", request.destination_endpoint)),
                    ..Task::new(id.clone(), task_state)
                }
            })
            .collect())
    }

    async fn search_endpoints(&self, limit: usize) -> Result<Vec<Endpoint>, TransferError> {
        let mut ids: Vec<String> = self.lock().endpoints.keys().cloned().collect();
        ids.sort();
        ids.truncate(limit);

        let mut endpoints = Vec::with_capacity(ids.len());
        for id in ids {
            endpoints.push(self.get_endpoint(&id).await?);
        }
        Ok(endpoints)
    }
}

#[derive(Default)]
struct StoreState {
    jobs: BTreeMap<JobId, JobRecord>,
    writes: Vec<(JobId, String, AttrValue)>,
    releases: Vec<JobId>,
    failing_releases: Vec<JobId>,
}

/// Job store fake holding records in memory.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<StoreState>,
    current: Option<JobId>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose process runs as job `current`.
    pub fn running_as(current: JobId) -> Self {
        let store = Self {
            state: Mutex::default(),
            current: Some(current),
        };
        store.insert(JobRecord::new(current));
        store
    }

    pub fn insert(&self, record: JobRecord) {
        self.lock().jobs.insert(record.id, record);
    }

    /// Put a job on hold, as the scheduler does when it exits non-zero.
    pub fn hold(&self, id: JobId, reason: &str) {
        let mut state = self.lock();
        let job = state.jobs.entry(id).or_insert_with(|| JobRecord::new(id));
        job.set("JobStatus", AttrValue::Integer(JobStatus::Held.code()));
        job.set("HoldReason", AttrValue::String(reason.to_string()));
    }

    /// Make `release_hold` fail for `id`.
    pub fn fail_releases_of(&self, id: JobId) {
        self.lock().failing_releases.push(id);
    }

    pub fn job(&self, id: JobId) -> Option<JobRecord> {
        self.lock().jobs.get(&id).cloned()
    }

    pub fn writes(&self) -> Vec<(JobId, String, AttrValue)> {
        self.lock().writes.clone()
    }

    pub fn releases(&self) -> Vec<JobId> {
        self.lock().releases.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn list_owned_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self.lock().jobs.values().cloned().collect())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.job(id))
    }

    async fn set_attribute(&self, id: JobId, key: &str, value: AttrValue) -> Result<()> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("No such job {id}"))?;
        job.set(key, value.clone());
        state.writes.push((id, key.to_string(), value));
        Ok(())
    }

    async fn release_hold(&self, id: JobId) -> Result<()> {
        let mut state = self.lock();
        if state.failing_releases.contains(&id) {
            return Err(anyhow!("Simulated release failure for job {id}"));
        }
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| anyhow!("No such job {id}"))?;
        job.set("JobStatus", AttrValue::Integer(JobStatus::Idle.code()));
        job.set("HoldReason", AttrValue::Undefined);
        state.releases.push(id);
        Ok(())
    }

    fn current_job(&self) -> Option<JobId> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_endpoints_are_active() {
        let service = SimulatedTransferService::new();
        assert!(service.get_endpoint("anything").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn manual_endpoints_reject_autoactivation() {
        let service = SimulatedTransferService::new();
        service.set_endpoint("ep", ActivationStatus::NeedsManual);
        assert_eq!(
            service.autoactivate("ep").await.unwrap(),
            AutoActivation::Rejected
        );
        service.activate("ep");
        assert!(service.get_endpoint("ep").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn scripted_polls_run_in_order() {
        let service = SimulatedTransferService::new();
        service.script_polls([SimulatedPoll::NotDone, SimulatedPoll::TransientError]);
        let t = Duration::from_secs(1);

        assert_eq!(service.poll_task("t", t, t).await.unwrap(), PollOutcome::NotDone);
        assert!(service.poll_task("t", t, t).await.is_err());
        assert_eq!(service.poll_task("t", t, t).await.unwrap(), PollOutcome::Done);
        assert_eq!(service.calls().poll_task, 3);
    }

    #[tokio::test]
    async fn released_jobs_leave_hold() {
        let id = JobId::new(5, 0);
        let store = MemoryJobStore::new();
        store.hold(id, "failed");
        assert!(store.job(id).unwrap().is_held());

        store.release_hold(id).await.unwrap();
        assert!(!store.job(id).unwrap().is_held());
        assert_eq!(store.releases(), vec![id]);
    }
}
