use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use globus_condor::commands::{self, TransferOptions};
use globus_condor::core::{SyncLevel, WaitPolicy, submit_description};
use globus_condor::error::AppError;
use globus_condor::{adapters, config, context, logging};
use serde::Serialize;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "globus")]
#[command(
    about = "Drive Globus transfers from the command line and track them as HTCondor jobs",
    long_about = "Initial setup: put a Globus refresh token in the configuration file \
                  (see `globus settings` for the effective configuration)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,

    /// Print an HTCondor submit description that runs the command as a job
    /// instead of running it.
    #[arg(long, global = true)]
    as_job: bool,
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    /// Show log messages as the CLI runs. Pass more times for more verbosity.
    #[serde(skip_serializing_if = "is_zero")]
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    json_logs: Option<bool>,

    /// Use the in-process transfer service and job store.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    simulation: Option<bool>,
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}

#[derive(Subcommand)]
enum Commands {
    /// Activate an endpoint.
    Activate { endpoint: String },

    /// Initiate a file transfer task and print its task id.
    ///
    /// Each transfer specification has the form SOURCE_PATH:DESTINATION_PATH.
    /// If both paths end with / the transfer is a recursive directory
    /// transfer; if neither does it is a single file. Mixing is an error.
    Transfer {
        source_endpoint: String,
        destination_endpoint: String,
        #[arg(required = true)]
        transfers: Vec<String>,

        /// A label for the transfer.
        #[arg(long)]
        label: Option<String>,

        /// How to decide whether to actually transfer a file or not.
        #[arg(long, value_enum, default_value_t = SyncLevel::Checksum)]
        sync_level: SyncLevel,

        /// Do not preserve file modification timestamps.
        #[arg(long)]
        no_preserve_timestamps: bool,

        /// Do not compare checksums at source and destination after transferring.
        #[arg(long)]
        no_verify_checksums: bool,

        /// Wait for the transfer to complete.
        #[arg(long)]
        wait: bool,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Wait for a task to complete.
    Wait {
        task_id: String,
        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Cancel a task.
    Cancel { task_id: String },

    /// Interactively resolve holds on this tool's HTCondor jobs.
    Release,

    /// Display full information about an endpoint as JSON.
    Info { endpoint: String },

    /// List your endpoints.
    Endpoints {
        /// How many results to get.
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// List recent transfer tasks.
    History {
        /// How many results to get.
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// List the directory contents of a path on an endpoint.
    ///
    /// Intended for humans; `manifest` is more useful as part of a workflow.
    Ls {
        endpoint: String,
        /// The path to list the contents of.
        #[arg(long, default_value = "~/")]
        path: String,
    },

    /// Print a JSON manifest of directory contents on an endpoint.
    Manifest {
        endpoint: String,
        /// The path to list the contents of.
        #[arg(long, default_value = "~/")]
        path: String,
        /// Print compact JSON instead of indented JSON.
        #[arg(long)]
        compact: bool,
    },

    /// Show this tool's HTCondor jobs.
    Status,

    /// Display the effective settings.
    Settings,
}

#[derive(Args)]
struct WaitArgs {
    /// Seconds after which a single attempt fails.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Seconds between task status checks.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// How many times to try waiting.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    attempts: u32,
}

impl WaitArgs {
    fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(self.timeout),
            interval: Duration::from_secs(self.interval),
            max_attempts: self.attempts,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::AppConfig::new(Some(&cli.global)) {
        Ok(config) => config,
        Err(err) => return report(AppError::Other(err)),
    };

    logging::init(logging::LogConfig {
        json: config.json_logs,
        verbosity: config.verbose,
        unattended: !adapters::is_interactive(),
    });
    tracing::debug!(args = ?std::env::args().collect::<Vec<_>>(), "Called");

    if cli.as_job {
        let mut args = std::env::args();
        let exe = args.next().unwrap_or_else(|| "globus".to_string());
        let args = submit_description::strip_as_job_flag(args);
        print!(
            "{}",
            submit_description::render(&exe, &args, &config.condor.owner_attribute)
        );
        return ExitCode::SUCCESS;
    }

    let ctx = context::AppContext::new(config);
    match run(&ctx, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(err),
    }
}

async fn run(ctx: &context::AppContext, command: Commands) -> Result<(), AppError> {
    match command {
        Commands::Activate { endpoint } => commands::activate(ctx, &endpoint).await,
        Commands::Transfer {
            source_endpoint,
            destination_endpoint,
            transfers,
            label,
            sync_level,
            no_preserve_timestamps,
            no_verify_checksums,
            wait,
            wait_args,
        } => {
            let options = TransferOptions {
                source_endpoint,
                destination_endpoint,
                specs: transfers,
                label,
                sync_level,
                preserve_timestamps: !no_preserve_timestamps,
                verify_checksums: !no_verify_checksums,
                wait: wait.then(|| wait_args.policy()),
            };
            let task_id = commands::transfer(ctx, options).await?;
            println!("{task_id}");
            Ok(())
        }
        Commands::Wait { task_id, wait_args } => {
            commands::wait(ctx, &task_id, wait_args.policy()).await?;
            println!("{task_id}");
            Ok(())
        }
        Commands::Cancel { task_id } => {
            commands::cancel(ctx, &task_id).await?;
            println!("Task {task_id} has been successfully cancelled");
            Ok(())
        }
        Commands::Release => {
            let report = commands::release(ctx).await?;
            for job in &report.jobs {
                let id = job.job;
                for endpoint in &job.resolved {
                    println!("Job {id}: endpoint {endpoint} activated");
                }
                for (endpoint, reason) in &job.unresolved {
                    eprintln!("Warning: job {id}: endpoint {endpoint} not activated: {reason}");
                }
                match &job.error {
                    None => println!("Released job {id}"),
                    Some(err) => eprintln!("Warning: job {id} was not released: {err}"),
                }
            }
            if report.jobs.is_empty() {
                println!("No held jobs");
            }
            if !report.is_clean() {
                eprintln!(
                    "Warning: not every held job was fully resolved; jobs still waiting on an endpoint will be held again"
                );
            }
            tracing::info!(released = report.released_count(), "Release finished");
            Ok(())
        }
        Commands::Info { endpoint } => {
            println!("{}", commands::endpoint_info(ctx, &endpoint).await?);
            Ok(())
        }
        Commands::Endpoints { limit } => {
            let endpoints = commands::endpoints(ctx, limit).await?;
            print!("{}", commands::render_endpoints(&endpoints));
            println!("\nWeb View: {}", commands::web_view(ctx, "endpoints")?);
            Ok(())
        }
        Commands::History { limit } => {
            let tasks = commands::history(ctx, limit).await?;
            print!("{}", commands::render_history(&tasks));
            println!(
                "\nWeb View: {}",
                commands::web_view(ctx, "activity?show=history")?
            );
            Ok(())
        }
        Commands::Ls { endpoint, path } => {
            let entries = commands::list_directory(ctx, &endpoint, &path).await?;
            print!("{}", commands::render_listing(&entries));
            Ok(())
        }
        Commands::Manifest {
            endpoint,
            path,
            compact,
        } => {
            println!("{}", commands::manifest(ctx, &endpoint, &path, compact).await?);
            Ok(())
        }
        Commands::Status => {
            let jobs = commands::status(ctx).await?;
            print!("{}", commands::render_status(&jobs, chrono::Utc::now()));
            Ok(())
        }
        Commands::Settings => {
            print!("{}", commands::settings(ctx)?);
            Ok(())
        }
    }
}

fn report(err: AppError) -> ExitCode {
    tracing::error!(kind = err.kind(), "{err:#}");
    eprintln!("Error: {err:#}");
    ExitCode::from(err.exit_code() as u8)
}
