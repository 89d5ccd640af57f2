use anyhow::Result;
use async_trait::async_trait;

use crate::core::models::{AttrValue, JobId, JobRecord};

/// Access to the scheduler's job records.
///
/// Reads and writes are not transactional: a read followed by a write may
/// race another process editing the same record. Only one `release` run per
/// job record at a time is supported.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Every job record tagged as belonging to this tool.
    async fn list_owned_jobs(&self) -> Result<Vec<JobRecord>>;

    async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>>;

    async fn set_attribute(&self, id: JobId, key: &str, value: AttrValue) -> Result<()>;

    async fn release_hold(&self, id: JobId) -> Result<()>;

    /// The job this process is running as, if it runs under the scheduler.
    fn current_job(&self) -> Option<JobId>;
}
