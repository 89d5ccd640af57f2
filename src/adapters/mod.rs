use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{JobStore, TransferService};
use crate::error::TransferError;

pub mod condor;
pub mod globus;
pub mod simulated;
pub mod terminal;

pub use condor::CondorJobStore;
pub use globus::GlobusTransferClient;
pub use simulated::{CallCounts, MemoryJobStore, SimulatedPoll, SimulatedTransferService};
pub use terminal::{TerminalPrompter, is_interactive};

pub fn get_transfer_service(config: &AppConfig) -> Result<Arc<dyn TransferService>, TransferError> {
    if config.simulation {
        return Ok(Arc::new(SimulatedTransferService::new()));
    }

    Ok(Arc::new(GlobusTransferClient::from_config(config)?))
}

pub fn get_job_store(config: &AppConfig) -> Arc<dyn JobStore> {
    if config.simulation {
        return Arc::new(MemoryJobStore::new());
    }

    Arc::new(CondorJobStore::new(&config.condor))
}
