//! Endpoint activation.
//!
//! An endpoint must be activated before data can move to or from it. The
//! orchestrator tries the cheap paths first (already active, then automatic
//! activation) and only falls back to manual activation for what is left.
//! Manual activation either blocks on a human at the terminal or, when no
//! human is attached, records the endpoint on the current job so that a later
//! `release` run can finish the job.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, error, info, warn};

use crate::core::job_store::JobStore;
use crate::core::models::{
    AttrValue, AutoActivation, Endpoint, JobId, JobRecord, activation_index, activation_key,
};
use crate::core::transfer_service::TransferService;
use crate::error::{AppError, TransferError};

/// Something that can put a message in front of a human and wait for them.
#[async_trait]
pub trait Prompter: Send + Sync {
    fn show(&self, message: &str);

    /// Wait for the operator to confirm. `Ok(false)` means they aborted.
    async fn acknowledge(&self, prompt: &str) -> Result<bool>;
}

/// How manual activation is carried out, chosen once at startup.
#[derive(Clone)]
pub enum InteractionMode {
    /// A human is attached: show the activation URL and wait for them.
    Blocking(Arc<dyn Prompter>),
    /// Nobody is watching: record the endpoint on `job` for a later `release`.
    Deferred { job: Option<JobId> },
}

pub struct EndpointActivator {
    transfer: Arc<dyn TransferService>,
    jobs: Arc<dyn JobStore>,
    file_manager_url: Url,
}

impl EndpointActivator {
    pub fn new(
        transfer: Arc<dyn TransferService>,
        jobs: Arc<dyn JobStore>,
        file_manager_url: Url,
    ) -> Self {
        Self {
            transfer,
            jobs,
            file_manager_url,
        }
    }

    /// Make every endpoint usable, or fail naming all that could not be.
    ///
    /// A lookup or activation failure on one endpoint does not stop the
    /// others; only a rejected credential or an operator abort ends the batch.
    pub async fn activate_all(
        &self,
        endpoints: &[String],
        mode: &InteractionMode,
    ) -> Result<(), AppError> {
        let mut requested: Vec<String> = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if !requested.contains(endpoint) {
                requested.push(endpoint.clone());
            }
        }

        let mut failed = Vec::new();
        let mut inactive = Vec::new();
        for endpoint in &requested {
            match self.transfer.get_endpoint(endpoint).await {
                Ok(info) if info.is_active() => {
                    debug!(endpoint = %endpoint, "Endpoint already active");
                }
                Ok(_) => inactive.push(endpoint.clone()),
                Err(err) => note_failure(endpoint, err, &mut failed)?,
            }
        }

        let auto = self.activate_automatically(&inactive).await?;
        failed.extend(auto.failed);
        let unresolved = self.activate_manually(&auto.inactive, mode).await?;

        let blocked: Vec<String> = requested
            .iter()
            .filter(|endpoint| failed.contains(endpoint) || unresolved.contains(endpoint))
            .cloned()
            .collect();
        if !blocked.is_empty() {
            error!(endpoints = ?blocked, "Endpoint activation failed");
            return Err(AppError::Activation { endpoints: blocked });
        }

        for endpoint in &requested {
            match self.transfer.get_endpoint(endpoint).await {
                Ok(Endpoint {
                    expires_in: Some(expires_in),
                    ..
                }) => info!(
                    endpoint = %endpoint,
                    expires_in_secs = expires_in.as_secs(),
                    "Endpoint activation will expire"
                ),
                Ok(_) => info!(endpoint = %endpoint, "Endpoint activation does not expire"),
                Err(err) => debug!(endpoint = %endpoint, error = %err, "Could not read activation expiry"),
            }
        }

        Ok(())
    }

    /// Try automatic activation on each endpoint.
    pub async fn activate_automatically(
        &self,
        endpoints: &[String],
    ) -> Result<AutoActivationPass, AppError> {
        let mut pass = AutoActivationPass::default();

        for endpoint in endpoints {
            match self.transfer.autoactivate(endpoint).await {
                Ok(AutoActivation::Rejected) => {
                    debug!(endpoint = %endpoint, "Automatic activation rejected");
                    pass.inactive.push(endpoint.clone());
                }
                Ok(AutoActivation::Activated) => match self.transfer.get_endpoint(endpoint).await {
                    Ok(info) if info.is_active() => {
                        info!(endpoint = %endpoint, "Endpoint activated automatically");
                    }
                    Ok(_) => {
                        warn!(
                            endpoint = %endpoint,
                            "Automatic activation accepted but endpoint is still inactive"
                        );
                        pass.inactive.push(endpoint.clone());
                    }
                    Err(err) => note_failure(endpoint, err, &mut pass.failed)?,
                },
                Err(err) => note_failure(endpoint, err, &mut pass.failed)?,
            }
        }

        Ok(pass)
    }

    /// Manual activation; returns the endpoints left unresolved.
    ///
    /// In blocking mode an endpoint is only left unresolved when the service
    /// fails on it; otherwise this waits until it is active, or fails with
    /// [`AppError::Cancelled`] when the operator aborts.
    pub async fn activate_manually(
        &self,
        endpoints: &[String],
        mode: &InteractionMode,
    ) -> Result<Vec<String>, AppError> {
        if endpoints.is_empty() {
            return Ok(Vec::new());
        }

        match mode {
            InteractionMode::Blocking(prompter) => {
                let mut unresolved = Vec::new();
                for endpoint in endpoints {
                    match self
                        .wait_for_manual_activation(endpoint, prompter.as_ref())
                        .await
                    {
                        Ok(()) => {}
                        Err(err @ (AppError::Cancelled | AppError::Authorization(_))) => {
                            return Err(err);
                        }
                        Err(err) => {
                            warn!(endpoint = %endpoint, error = %err, "Manual activation failed");
                            unresolved.push(endpoint.clone());
                        }
                    }
                }
                Ok(unresolved)
            }
            InteractionMode::Deferred { job } => {
                for endpoint in endpoints {
                    match self.transfer.get_endpoint(endpoint).await {
                        Ok(info) => error!(
                            endpoint = %endpoint,
                            url = %self.activation_url(&info),
                            "Endpoint requires manual activation, but we are not running interactively"
                        ),
                        Err(err) => error!(
                            endpoint = %endpoint,
                            error = %err,
                            "Endpoint requires manual activation, but we are not running interactively"
                        ),
                    }
                }

                match job {
                    Some(job) => self.record_pending(*job, endpoints).await?,
                    None => warn!(
                        "Not running as a scheduler job; pending activations are not recorded"
                    ),
                }

                Ok(endpoints.to_vec())
            }
        }
    }

    /// Web URL a human opens to activate `endpoint`.
    pub fn activation_url(&self, endpoint: &Endpoint) -> Url {
        let mut url = self.file_manager_url.clone();
        url.query_pairs_mut()
            .append_pair("origin_id", &endpoint.internal_id);
        url
    }

    async fn wait_for_manual_activation(
        &self,
        endpoint: &str,
        prompter: &dyn Prompter,
    ) -> Result<(), AppError> {
        loop {
            let info = self.transfer.get_endpoint(endpoint).await?;
            if info.is_active() {
                info!(endpoint = %endpoint, "Endpoint activated manually");
                return Ok(());
            }

            prompter.show(&format!(
                "Endpoint {endpoint} requires manual activation, please open the following URL in a browser to activate the endpoint: {}",
                self.activation_url(&info)
            ));

            let confirmed = prompter
                .acknowledge("Press ENTER after activating the endpoint (or ctrl-c to abort)...")
                .await?;
            if !confirmed {
                return Err(AppError::Cancelled);
            }
        }
    }

    async fn record_pending(&self, job: JobId, endpoints: &[String]) -> Result<()> {
        let record = self
            .jobs
            .get_job(job)
            .await
            .with_context(|| format!("Failed to read job {job}"))?
            .unwrap_or_else(|| JobRecord::new(job));

        let mut mailbox = Mailbox::from_record(&record);
        for endpoint in endpoints {
            let key = mailbox.claim(endpoint);
            self.jobs
                .set_attribute(job, &key, AttrValue::String(endpoint.clone()))
                .await
                .with_context(|| format!("Failed to set {key} on job {job}"))?;
            info!(job = %job, key = %key, endpoint = %endpoint, "Recorded pending activation");
        }

        Ok(())
    }
}

/// Outcome of [`EndpointActivator::activate_automatically`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AutoActivationPass {
    /// Endpoints that need manual activation.
    pub inactive: Vec<String>,
    /// Endpoints the service failed on.
    pub failed: Vec<String>,
}

/// Set `endpoint` aside after a service failure. A rejected credential
/// affects every endpoint and is returned instead.
fn note_failure(
    endpoint: &str,
    err: TransferError,
    failed: &mut Vec<String>,
) -> Result<(), AppError> {
    if let TransferError::Unauthorized(msg) = err {
        return Err(AppError::Authorization(msg));
    }
    warn!(endpoint = %endpoint, error = %err, "Endpoint lookup failed");
    failed.push(endpoint.to_string());
    Ok(())
}

/// Index allocation over a job's `ENDPOINT_ACTIVATION_REQUIRED_<n>` slots.
struct Mailbox {
    slots: BTreeMap<u32, AttrValue>,
}

impl Mailbox {
    fn from_record(record: &JobRecord) -> Self {
        let slots = record
            .attributes
            .iter()
            .filter_map(|(key, value)| activation_index(key).map(|idx| (idx, value.clone())))
            .collect();
        Self { slots }
    }

    /// Pick the slot for `endpoint`: the one already naming it, else a cleared
    /// one, else a fresh index past every existing slot.
    fn claim(&mut self, endpoint: &str) -> String {
        let existing = self
            .slots
            .iter()
            .find(|(_, value)| value.as_str() == Some(endpoint))
            .map(|(idx, _)| *idx);
        let cleared = || {
            self.slots
                .iter()
                .find(|(_, value)| value.is_undefined())
                .map(|(idx, _)| *idx)
        };
        let fresh = || {
            self.slots
                .keys()
                .next_back()
                .map(|idx| idx + 1)
                .unwrap_or(0)
        };

        let idx = existing.or_else(cleared).unwrap_or_else(fresh);
        self.slots
            .insert(idx, AttrValue::String(endpoint.to_string()));
        activation_key(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(slots: &[(u32, AttrValue)]) -> JobRecord {
        let mut record = JobRecord::new(JobId::new(42, 0));
        for (idx, value) in slots {
            record.set(activation_key(*idx), value.clone());
        }
        record
    }

    #[test]
    fn empty_mailbox_starts_at_zero() {
        let mut mailbox = Mailbox::from_record(&record_with(&[]));
        assert_eq!(mailbox.claim("a"), activation_key(0));
        assert_eq!(mailbox.claim("b"), activation_key(1));
    }

    #[test]
    fn endpoint_already_recorded_keeps_its_slot() {
        let mut mailbox =
            Mailbox::from_record(&record_with(&[(4, AttrValue::String("a".into()))]));
        assert_eq!(mailbox.claim("a"), activation_key(4));
    }

    #[test]
    fn cleared_slot_is_reused_before_growing() {
        let mut mailbox = Mailbox::from_record(&record_with(&[
            (0, AttrValue::String("x".into())),
            (2, AttrValue::Undefined),
        ]));
        assert_eq!(mailbox.claim("a"), activation_key(2));
        assert_eq!(mailbox.claim("b"), activation_key(3));
    }

    #[test]
    fn claims_are_distinct() {
        let mut mailbox = Mailbox::from_record(&record_with(&[(7, AttrValue::String("x".into()))]));
        let keys: Vec<String> = ["a", "b", "c"].iter().map(|e| mailbox.claim(e)).collect();
        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert!(!keys.contains(&activation_key(7)));
    }
}
