//! HTCondor job store, driven through the condor command line tools.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CondorConfig;
use crate::core::job_store::JobStore;
use crate::core::models::{AttrValue, JobId, JobRecord};

/// Environment variable pointing at the running job's ad file.
const JOB_AD_ENV: &str = "_CONDOR_JOB_AD";

static AD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$").unwrap());

pub struct CondorJobStore {
    owner_attribute: String,
    bin_dir: Option<PathBuf>,
    current: Option<JobId>,
}

impl CondorJobStore {
    pub fn new(config: &CondorConfig) -> Self {
        let current = std::env::var_os(JOB_AD_ENV).and_then(|path| {
            match current_job_from_ad_file(Path::new(&path)) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "Failed to read the job ad of this process");
                    None
                }
            }
        });
        debug!(current = ?current, "Condor job store ready");

        Self {
            owner_attribute: config.owner_attribute.clone(),
            bin_dir: config.bin_dir.clone(),
            current,
        }
    }

    fn tool(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    async fn run(&self, tool: &str, args: &[String]) -> Result<String> {
        debug!(tool, args = ?args, "Running condor tool");
        let output = Command::new(self.tool(tool))
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {tool}"))?;

        if !output.status.success() {
            bail!(
                "{tool} failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        String::from_utf8(output.stdout).with_context(|| format!("{tool} printed non-UTF-8 output"))
    }

    async fn query(&self, args: Vec<String>) -> Result<Vec<JobRecord>> {
        let mut full = vec!["-json".to_string()];
        full.extend(args);
        let stdout = self.run("condor_q", &full).await?;
        parse_condor_q_json(&stdout)
    }
}

#[async_trait]
impl JobStore for CondorJobStore {
    async fn list_owned_jobs(&self) -> Result<Vec<JobRecord>> {
        self.query(vec![
            "-constraint".to_string(),
            format!("{} =?= True", self.owner_attribute),
        ])
        .await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let jobs = self.query(vec![id.to_string()]).await?;
        Ok(jobs.into_iter().find(|job| job.id == id))
    }

    async fn set_attribute(&self, id: JobId, key: &str, value: AttrValue) -> Result<()> {
        self.run(
            "condor_qedit",
            &[id.to_string(), key.to_string(), value.to_classad()],
        )
        .await?;
        Ok(())
    }

    async fn release_hold(&self, id: JobId) -> Result<()> {
        self.run("condor_release", &[id.to_string()]).await?;
        Ok(())
    }

    fn current_job(&self) -> Option<JobId> {
        self.current
    }
}

/// Job ads printed by `condor_q -json`. No matching jobs prints nothing.
pub fn parse_condor_q_json(stdout: &str) -> Result<Vec<JobRecord>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let ads: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(stdout).context("Failed to parse condor_q output")?;

    ads.into_iter().map(|ad| record_from_ad(&ad)).collect()
}

fn record_from_ad(ad: &serde_json::Map<String, Value>) -> Result<JobRecord> {
    let cluster = ad
        .get("ClusterId")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("job ad has no ClusterId"))?;
    let proc = ad.get("ProcId").and_then(Value::as_u64).unwrap_or(0);

    let mut record = JobRecord::new(JobId::new(cluster, proc));
    for (key, value) in ad {
        record.set(key.clone(), AttrValue::from_json(value));
    }
    Ok(record)
}

/// Identity of the running job from its ad file (`Key = value` lines).
pub fn current_job_from_ad_file(path: &Path) -> Result<Option<JobId>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job ad {}", path.display()))?;
    Ok(current_job_from_ad(&text))
}

fn current_job_from_ad(text: &str) -> Option<JobId> {
    let mut cluster = None;
    let mut proc = None;

    for line in text.lines() {
        let Some(caps) = AD_LINE.captures(line) else {
            continue;
        };
        match &caps[1] {
            "ClusterId" => cluster = caps[2].parse().ok(),
            "ProcId" => proc = caps[2].parse().ok(),
            _ => {}
        }
    }

    cluster.map(|cluster| JobId::new(cluster, proc.unwrap_or(0)))
}
