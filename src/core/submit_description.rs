//! HTCondor submit description for running a command as a scheduled job.

/// Render a submit description that runs `exe args...` as a local-universe
/// job tagged as ours, held by the scheduler when it exits non-zero.
pub fn render(exe: &str, args: &[String], owner_attribute: &str) -> String {
    let args_string = args.join(" ");
    let is_transfer = args.iter().any(|arg| arg == "transfer");

    format!(
        r#"universe = local

JobBatchName = "globus {args_string}"

executable = {exe}
arguments = {args_string}

log = globus_job_$(CLUSTER)_$(PROCESS).log
output = globus_job_$(CLUSTER)_$(PROCESS).out
error = globus_job_$(CLUSTER)_$(PROCESS).err

request_cpus = 1
request_memory = 200MB
request_disk = 1GB

on_exit_hold = ExitCode =!= 0
on_exit_hold_reason = "globus command failed; try running `globus release` or looking at job logs for more information"

should_transfer_files = NO
transfer_executable = False

environment = "HOME=$ENV(HOME)"

+{owner_attribute} = True
+IsTransferJob = {is_transfer}
+WantIOProxy = True

cron_prep_time = 300
cron_window = 300

queue 1
"#,
        is_transfer = if is_transfer { "True" } else { "False" },
    )
}

/// Command line arguments with the job-rendering flag removed.
pub fn strip_as_job_flag<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter().filter(|arg| arg != "--as-job").collect()
}
