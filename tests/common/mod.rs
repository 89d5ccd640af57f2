//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use globus_condor::adapters::{MemoryJobStore, SimulatedTransferService};
use globus_condor::core::{EndpointActivator, Prompter};
use reqwest::Url;

pub const FILE_MANAGER: &str = "https://app.globus.org/file-manager";

pub fn activator(
    service: &Arc<SimulatedTransferService>,
    jobs: &Arc<MemoryJobStore>,
) -> EndpointActivator {
    EndpointActivator::new(
        service.clone(),
        jobs.clone(),
        Url::parse(FILE_MANAGER).unwrap(),
    )
}

/// Stands in for the operator: after `activate_after` acknowledgements it
/// activates `endpoints` on the simulated service.
pub struct OperatorPrompter {
    service: Arc<SimulatedTransferService>,
    endpoints: Vec<String>,
    activate_after: usize,
    acks: AtomicUsize,
    shown: Mutex<Vec<String>>,
}

impl OperatorPrompter {
    pub fn new(
        service: &Arc<SimulatedTransferService>,
        endpoints: &[&str],
        activate_after: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            service: service.clone(),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            activate_after,
            acks: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        })
    }

    pub fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for OperatorPrompter {
    fn show(&self, message: &str) {
        self.shown.lock().unwrap().push(message.to_string());
    }

    async fn acknowledge(&self, _prompt: &str) -> anyhow::Result<bool> {
        let acks = self.acks.fetch_add(1, Ordering::SeqCst) + 1;
        if acks >= self.activate_after {
            for endpoint in &self.endpoints {
                self.service.activate(endpoint);
            }
        }
        Ok(true)
    }
}

/// Operator who gives up at the first prompt.
pub struct AbortingPrompter;

#[async_trait]
impl Prompter for AbortingPrompter {
    fn show(&self, _message: &str) {}

    async fn acknowledge(&self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Fails the test if anyone tries to prompt.
pub struct UnreachablePrompter;

#[async_trait]
impl Prompter for UnreachablePrompter {
    fn show(&self, message: &str) {
        panic!("unexpected prompt: {message}");
    }

    async fn acknowledge(&self, prompt: &str) -> anyhow::Result<bool> {
        panic!("unexpected acknowledgement request: {prompt}");
    }
}
