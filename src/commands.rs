//! Command implementations. Each returns what the CLI prints on success.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::context::AppContext;
use crate::core::{
    CancelOutcome, DirEntry, Endpoint, EntryKind, HoldResolver, JobRecord, ReleaseReport,
    SyncLevel, Task, TransferRequest, WaitPolicy, parse_transfer_specs, wait_for_task,
};
use crate::error::AppError;

/// Options of the `transfer` command.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub source_endpoint: String,
    pub destination_endpoint: String,
    pub specs: Vec<String>,
    pub label: Option<String>,
    pub sync_level: SyncLevel,
    pub preserve_timestamps: bool,
    pub verify_checksums: bool,
    /// Wait for the task to finish before returning.
    pub wait: Option<WaitPolicy>,
}

pub async fn activate(ctx: &AppContext, endpoint: &str) -> Result<(), AppError> {
    let endpoint = ctx.config.resolve_endpoint(endpoint);
    ctx.activator()?.activate_all(&[endpoint], &ctx.mode).await
}

/// Submit a transfer and return its task id.
///
/// Every specification is checked before the transfer service is contacted.
pub async fn transfer(ctx: &AppContext, options: TransferOptions) -> Result<String, AppError> {
    let items = parse_transfer_specs(&options.specs)?;

    let source = ctx.config.resolve_endpoint(&options.source_endpoint);
    let destination = ctx.config.resolve_endpoint(&options.destination_endpoint);

    ctx.activator()?
        .activate_all(&[source.clone(), destination.clone()], &ctx.mode)
        .await?;

    let request = TransferRequest {
        source_endpoint: source,
        destination_endpoint: destination,
        items,
        label: options.label,
        sync_level: options.sync_level,
        preserve_timestamps: options.preserve_timestamps,
        verify_checksums: options.verify_checksums,
    };

    let transfer = ctx.transfer()?;
    let task_id = transfer.submit_transfer(&request).await?;
    info!(task_id = %task_id, items = request.items.len(), "Transfer submitted");

    if let Some(policy) = options.wait {
        wait_for_task(transfer.as_ref(), &task_id, policy).await?;
    }

    Ok(task_id)
}

pub async fn wait(ctx: &AppContext, task_id: &str, policy: WaitPolicy) -> Result<(), AppError> {
    wait_for_task(ctx.transfer()?.as_ref(), task_id, policy).await
}

pub async fn cancel(ctx: &AppContext, task_id: &str) -> Result<(), AppError> {
    let outcome = ctx
        .transfer()?
        .cancel_task(task_id)
        .await
        .map_err(|e| AppError::CancelTask {
            task_id: task_id.to_string(),
            reason: e.to_string(),
        })?;

    match outcome {
        CancelOutcome::Canceled => {
            info!(task_id, "Task cancelled");
            Ok(())
        }
        CancelOutcome::NotCanceled { code, message } => Err(AppError::CancelTask {
            task_id: task_id.to_string(),
            reason: format!("{code}: {message}"),
        }),
    }
}

/// Resolve and release held jobs.
///
/// A missing credential does not fail the command: it is reported against
/// the jobs that have endpoints to activate, and every held job is still
/// released.
pub async fn release(ctx: &AppContext) -> Result<ReleaseReport, AppError> {
    let resolver = HoldResolver::new(
        ctx.jobs.clone(),
        ctx.activator().map(Arc::new),
        ctx.prompter.clone(),
    );
    resolver.release_all().await
}

/// Endpoint document as pretty JSON.
pub async fn endpoint_info(ctx: &AppContext, endpoint: &str) -> Result<String, AppError> {
    let endpoint = ctx.config.resolve_endpoint(endpoint);
    let info = ctx.transfer()?.get_endpoint(&endpoint).await?;
    Ok(serde_json::to_string_pretty(&info.raw).context("Failed to render endpoint")?)
}

/// Contents of `path` on `endpoint`, activating the endpoint first.
pub async fn list_directory(
    ctx: &AppContext,
    endpoint: &str,
    path: &str,
) -> Result<Vec<DirEntry>, AppError> {
    let endpoint = ctx.config.resolve_endpoint(endpoint);
    ctx.activator()?
        .activate_all(std::slice::from_ref(&endpoint), &ctx.mode)
        .await?;

    let entries = ctx.transfer()?.list_directory(&endpoint, path).await?;
    info!(endpoint = %endpoint, path, entries = entries.len(), "Listed directory");
    Ok(entries)
}

/// Directory listing as JSON, indented unless `compact`.
pub async fn manifest(
    ctx: &AppContext,
    endpoint: &str,
    path: &str,
    compact: bool,
) -> Result<String, AppError> {
    let entries = list_directory(ctx, endpoint, path).await?;
    let json = if compact {
        serde_json::to_string(&entries)
    } else {
        serde_json::to_string_pretty(&entries)
    };
    Ok(json.context("Failed to render manifest")?)
}

pub async fn history(ctx: &AppContext, limit: usize) -> Result<Vec<Task>, AppError> {
    Ok(ctx.transfer()?.list_tasks(limit).await?)
}

pub async fn endpoints(ctx: &AppContext, limit: usize) -> Result<Vec<Endpoint>, AppError> {
    Ok(ctx.transfer()?.search_endpoints(limit).await?)
}

/// Web page next to the file manager, e.g. `activity?show=history`.
pub fn web_view(ctx: &AppContext, page: &str) -> Result<String, AppError> {
    let url = ctx
        .config
        .file_manager_url()?
        .join(page)
        .with_context(|| format!("Invalid web page '{page}'"))?;
    Ok(url.to_string())
}

/// Jobs owned by this tool, ordered by cluster id.
pub async fn status(ctx: &AppContext) -> Result<Vec<JobRecord>, AppError> {
    let mut jobs = ctx
        .jobs
        .list_owned_jobs()
        .await
        .context("Failed to list jobs")?;
    jobs.sort_by_key(|job| job.id);
    Ok(jobs)
}

pub fn settings(ctx: &AppContext) -> Result<String, AppError> {
    Ok(toml::to_string_pretty(&ctx.config.redacted()).context("Failed to render settings")?)
}

/// Tree-style rendering of job records for `status`.
pub fn render_status(jobs: &[JobRecord], now: DateTime<Utc>) -> String {
    let mut out = String::new();

    for job in jobs {
        let title = job
            .batch_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("ID: {}", job.id.cluster));

        let mut lines = vec![format!("{:<10} {title}", job.status().as_str())];
        if job.is_held() {
            lines.push(format!("Hold Reason: {}", job.hold_reason().unwrap_or("unknown")));
        }
        lines.push(format!("Cluster ID: {}", job.id.cluster));
        if let Some(changed) = job.status_changed_at() {
            lines.push(format!(
                "Last status change at {} ({} ago)",
                changed.format("%Y-%m-%d %H:%M:%S UTC"),
                human_duration(now - changed)
            ));
        }
        if let Some(submitted) = job.submitted_at() {
            lines.push(format!(
                "Originally submitted at {} ({} ago)",
                submitted.format("%Y-%m-%d %H:%M:%S UTC"),
                human_duration(now - submitted)
            ));
        }
        for (label, key) in [("Output", "Out"), ("Error", "Err"), ("Events", "UserLog")] {
            if let Some(path) = job.attribute(key).as_str() {
                lines.push(format!("{label}: {path}"));
            }
        }
        let pending = job.pending_activations();
        if !pending.is_empty() {
            let endpoints: Vec<&str> = pending.iter().map(|(_, ep)| ep.as_str()).collect();
            lines.push(format!("Awaiting activation: {}", endpoints.join(" ")));
        }

        let last = lines.len() - 1;
        for (idx, line) in lines.iter().enumerate() {
            let prefix = match idx {
                0 => "",
                i if i == last => "└─ ",
                _ => "├─ ",
            };
            let _ = writeln!(out, "{prefix}{line}");
        }
        out.push('\n');
    }

    out
}

pub fn render_listing(entries: &[DirEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let (kind, suffix) = match entry.kind {
            EntryKind::Dir => ("dir", "/"),
            EntryKind::File => ("file", ""),
            EntryKind::Other => ("other", ""),
        };
        let _ = writeln!(
            out,
            "{:<10} {kind:<5} {:>12}  {:<25} {}{suffix}",
            entry.permissions.as_deref().unwrap_or("-"),
            entry.size,
            entry.last_modified.as_deref().unwrap_or("-"),
            entry.name,
        );
    }
    out
}

pub fn render_history(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let _ = write!(out, "{:<10} {}", task.state.as_str(), task.id);
        if let Some(label) = &task.label {
            let _ = write!(out, "  {label}");
        }
        if let (Some(source), Some(destination)) = (&task.source, &task.destination) {
            let _ = write!(out, "  {source} -> {destination}");
        }
        if let Some(requested_at) = &task.requested_at {
            let _ = write!(out, "  ({requested_at})");
        }
        out.push('\n');
    }
    out
}

pub fn render_endpoints(endpoints: &[Endpoint]) -> String {
    let mut out = String::new();
    for endpoint in endpoints {
        let status = if endpoint.is_active() { "active" } else { "inactive" };
        let _ = writeln!(
            out,
            "{:<36}  {status:<8}  {}",
            endpoint.internal_id,
            endpoint.display_name.as_deref().unwrap_or("")
        );
    }
    out
}

fn human_duration(delta: chrono::TimeDelta) -> String {
    let secs = delta.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s} seconds"),
        s if s < 3600 => format!("{} minutes", s / 60),
        s if s < 86_400 => format!("{} hours", s / 3600),
        s => format!("{} days", s / 86_400),
    }
}
