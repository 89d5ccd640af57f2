use std::sync::{Arc, OnceLock};

use crate::adapters;
use crate::config::AppConfig;
use crate::core::{EndpointActivator, InteractionMode, JobStore, Prompter, TransferService};
use crate::error::AppError;

/// Everything a command needs, wired once per invocation.
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<dyn JobStore>,
    pub prompter: Arc<dyn Prompter>,
    pub mode: InteractionMode,
    transfer: OnceLock<Arc<dyn TransferService>>,
}

impl AppContext {
    /// Wire the real adapters. The interaction mode follows whether stdin is
    /// a terminal.
    pub fn new(config: AppConfig) -> Self {
        let jobs = adapters::get_job_store(&config);
        let prompter: Arc<dyn Prompter> = Arc::new(adapters::TerminalPrompter);
        let mode = if adapters::is_interactive() {
            InteractionMode::Blocking(prompter.clone())
        } else {
            InteractionMode::Deferred {
                job: jobs.current_job(),
            }
        };

        Self::with_parts(config, jobs, prompter, mode)
    }

    pub fn with_parts(
        config: AppConfig,
        jobs: Arc<dyn JobStore>,
        prompter: Arc<dyn Prompter>,
        mode: InteractionMode,
    ) -> Self {
        Self {
            config: Arc::new(config),
            jobs,
            prompter,
            mode,
            transfer: OnceLock::new(),
        }
    }

    /// Use `transfer` instead of building a client from the configuration.
    pub fn with_transfer(self, transfer: Arc<dyn TransferService>) -> Self {
        let _ = self.transfer.set(transfer);
        self
    }

    /// Transfer service, built on first use so commands that never talk to
    /// it do not need a credential.
    pub fn transfer(&self) -> Result<Arc<dyn TransferService>, AppError> {
        if let Some(transfer) = self.transfer.get() {
            return Ok(transfer.clone());
        }

        let transfer = adapters::get_transfer_service(&self.config)?;
        Ok(self.transfer.get_or_init(|| transfer).clone())
    }

    pub fn activator(&self) -> Result<EndpointActivator, AppError> {
        Ok(EndpointActivator::new(
            self.transfer()?,
            self.jobs.clone(),
            self.config.file_manager_url()?,
        ))
    }
}
