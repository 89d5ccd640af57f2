use std::time::Duration;

use async_trait::async_trait;

use crate::core::models::{
    AutoActivation, CancelOutcome, DirEntry, Endpoint, PollOutcome, Task, TransferRequest,
};
use crate::error::TransferError;

/// Remote transfer service, as seen by the orchestrators.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Current activation state of an endpoint.
    async fn get_endpoint(&self, endpoint_id: &str) -> Result<Endpoint, TransferError>;

    /// Ask the service to activate an endpoint without human help.
    async fn autoactivate(&self, endpoint_id: &str) -> Result<AutoActivation, TransferError>;

    /// Submit a transfer and return the id the service assigned to the task.
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String, TransferError>;

    /// Block until the task reaches a terminal state or `timeout` elapses,
    /// checking every `interval`.
    async fn poll_task(
        &self,
        task_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<PollOutcome, TransferError>;

    async fn get_task(&self, task_id: &str) -> Result<Task, TransferError>;

    async fn cancel_task(&self, task_id: &str) -> Result<CancelOutcome, TransferError>;

    /// Contents of `path` on an activated endpoint.
    async fn list_directory(
        &self,
        endpoint_id: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferError>;

    /// The caller's most recent tasks, newest first.
    async fn list_tasks(&self, limit: usize) -> Result<Vec<Task>, TransferError>;

    /// Endpoints owned by the caller.
    async fn search_endpoints(&self, limit: usize) -> Result<Vec<Endpoint>, TransferError>;
}
