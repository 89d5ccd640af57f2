//! Resolution of held jobs.
//!
//! A job that needed manual endpoint activation while running unattended
//! exits non-zero and is put on hold by the scheduler, leaving the endpoints
//! it was waiting for in `ENDPOINT_ACTIVATION_REQUIRED_<n>` attributes. This
//! module walks those jobs, lets a human activate the endpoints, clears the
//! attributes that were resolved and releases the hold.
//!
//! Releasing is unconditional: a job whose endpoints are still inactive will
//! record them again and go back on hold, so running the sweep repeatedly is
//! safe.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::core::activation::{EndpointActivator, InteractionMode, Prompter};
use crate::core::job_store::JobStore;
use crate::core::models::{AttrValue, JobId, JobRecord};
use crate::error::AppError;

/// What happened to one job during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResolution {
    pub job: JobId,
    /// Endpoints that are active now and whose attribute was cleared.
    pub resolved: Vec<String>,
    /// Endpoints that could not be activated, with the reason.
    pub unresolved: Vec<(String, String)>,
    pub released: bool,
    /// Per-job failure outside of endpoint activation.
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub jobs: Vec<JobResolution>,
}

impl ReleaseReport {
    pub fn released_count(&self) -> usize {
        self.jobs.iter().filter(|job| job.released).count()
    }

    pub fn is_clean(&self) -> bool {
        self.jobs
            .iter()
            .all(|job| job.released && job.unresolved.is_empty() && job.error.is_none())
    }
}

pub struct HoldResolver {
    jobs: Arc<dyn JobStore>,
    /// Activation is only needed for jobs with pending endpoints, so a
    /// missing credential is kept here and reported against those jobs.
    activator: Result<Arc<EndpointActivator>, String>,
    mode: InteractionMode,
}

impl HoldResolver {
    /// Resolution always happens interactively, whatever mode the rest of the
    /// process runs in.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        activator: Result<Arc<EndpointActivator>, AppError>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            jobs,
            activator: activator.map_err(|err| err.to_string()),
            mode: InteractionMode::Blocking(prompter),
        }
    }

    /// Sweep every held job owned by this tool.
    ///
    /// Only an operator abort ends the sweep early; any other failure is
    /// recorded against its job and the sweep moves on.
    pub async fn release_all(&self) -> Result<ReleaseReport, AppError> {
        let jobs = self
            .jobs
            .list_owned_jobs()
            .await
            .context("Failed to list jobs")?;

        let mut held: Vec<JobRecord> = jobs.into_iter().filter(JobRecord::is_held).collect();
        held.sort_by_key(|job| job.id);

        let mut report = ReleaseReport::default();
        for job in &held {
            report.jobs.push(self.resolve(job).await?);
        }

        Ok(report)
    }

    /// Resolve one job. Fails only with [`AppError::Cancelled`].
    pub async fn resolve(&self, job: &JobRecord) -> Result<JobResolution, AppError> {
        info!(job = %job.id, "Attempting to resolve holds for job");

        let mut resolution = JobResolution {
            job: job.id,
            resolved: Vec::new(),
            unresolved: Vec::new(),
            released: false,
            error: None,
        };

        let pending = job.pending_activations();
        if !pending.is_empty() {
            match &self.activator {
                Ok(activator) => {
                    self.activate_pending(job.id, activator, pending, &mut resolution)
                        .await?;
                }
                Err(reason) => {
                    warn!(job = %job.id, reason = %reason, "Cannot activate endpoints for job");
                    for (_, endpoint) in pending {
                        resolution.unresolved.push((endpoint, reason.clone()));
                    }
                }
            }
        }

        match self.jobs.release_hold(job.id).await {
            Ok(()) => {
                info!(job = %job.id, "Released job");
                resolution.released = true;
            }
            Err(err) => {
                warn!(job = %job.id, error = %err, "Failed to release job");
                resolution.error = Some(format!("{err:#}"));
            }
        }

        Ok(resolution)
    }

    async fn activate_pending(
        &self,
        job: JobId,
        activator: &EndpointActivator,
        pending: Vec<(String, String)>,
        resolution: &mut JobResolution,
    ) -> Result<(), AppError> {
        for (key, endpoint) in pending {
            match activator
                .activate_manually(std::slice::from_ref(&endpoint), &self.mode)
                .await
            {
                Ok(unresolved) if unresolved.is_empty() => {
                    match self.jobs.set_attribute(job, &key, AttrValue::Undefined).await {
                        Ok(()) => {
                            info!(job = %job, key = %key, endpoint = %endpoint, "Cleared pending activation");
                            resolution.resolved.push(endpoint);
                        }
                        Err(err) => {
                            warn!(job = %job, key = %key, error = %err, "Failed to clear pending activation");
                            resolution
                                .unresolved
                                .push((endpoint, format!("failed to clear {key}: {err:#}")));
                        }
                    }
                }
                Ok(_) => resolution.unresolved.push((
                    endpoint,
                    "the transfer service could not look up the endpoint".to_string(),
                )),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(err) => {
                    warn!(job = %job, endpoint = %endpoint, error = %err, "Could not activate endpoint");
                    resolution.unresolved.push((endpoint, err.to_string()));
                }
            }
        }

        Ok(())
    }
}
