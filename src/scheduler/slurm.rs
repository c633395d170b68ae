use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Output;

use anyhow::Context;
use tokio::process::Command;

use crate::JobId;
use crate::common::error::LaunchError;
use crate::common::placeholders::fill_placeholders_log;
use crate::descriptor::JobDescriptor;
use crate::descriptor::script::build_submit_script;
use crate::scheduler::{Scheduler, SubmittedJob};

/// Name of the script that will be submitted to SLURM.
pub const SUBMIT_SCRIPT_NAME: &str = "switchq-submit.sh";

/// Name of a file that will store the job id of a submitted job.
const JOBID_FILE_NAME: &str = "jobid";

/// Submits jobs through `sbatch`. The script body re-invokes this binary's
/// `run` command inside the allocation.
pub struct SlurmScheduler {
    submit_dir: PathBuf,
    launcher_path: PathBuf,
    job_file: PathBuf,
}

impl SlurmScheduler {
    pub fn new(submit_dir: PathBuf, job_file: PathBuf) -> anyhow::Result<SlurmScheduler> {
        let launcher_path = std::env::current_exe().context("Cannot get switchq path")?;
        Ok(SlurmScheduler {
            submit_dir,
            launcher_path,
            job_file,
        })
    }

    pub fn render_script(&self, descriptor: &JobDescriptor) -> String {
        let launcher_cmd = format!(
            "{} run --job-file {}",
            self.launcher_path.display(),
            self.job_file.display()
        );
        build_submit_script(descriptor, &self.submit_dir, &launcher_cmd)
    }
}

impl Scheduler for SlurmScheduler {
    fn submit(
        &mut self,
        descriptor: &JobDescriptor,
    ) -> Pin<Box<dyn Future<Output = crate::Result<SubmittedJob>>>> {
        let script = self.render_script(descriptor);
        let submit_dir = self.submit_dir.clone();
        let job_name = descriptor.resources.job_name.clone();
        let mut stdout = descriptor.logs.stdout.clone();
        let mut stderr = descriptor.logs.stderr.clone();

        Box::pin(async move {
            let id = run_sbatch(script, &submit_dir).await?;
            fill_placeholders_log(&mut stdout, &id, &job_name, &submit_dir);
            fill_placeholders_log(&mut stderr, &id, &job_name, &submit_dir);
            Ok(SubmittedJob { id, stdout, stderr })
        })
    }
}

/// Writes the submit script into `submit_dir`, runs `sbatch` on it and
/// parses the assigned job id from its output.
async fn run_sbatch(script: String, submit_dir: &Path) -> crate::Result<JobId> {
    let script_path = submit_dir.join(SUBMIT_SCRIPT_NAME);
    std::fs::write(&script_path, script)
        .map_err(|e| format!("Cannot write script into {}: {e}", script_path.display()))?;

    let arguments = vec!["sbatch".to_string(), script_path.display().to_string()];
    log::debug!("Running command `{}`", arguments.join(" "));
    let mut command = Command::new(&arguments[0]);
    command.args(&arguments[1..]);
    command.current_dir(submit_dir);

    let output = command
        .output()
        .await
        .map_err(|e| format!("sbatch start failed: {e}"))?;
    let output = check_sbatch_output(output)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    log::debug!("Sbatch output: {}", stdout.trim());

    let id = parse_sbatch_job_id(&stdout)?;

    // Keep the job id next to the script as debug information
    std::fs::write(submit_dir.join(JOBID_FILE_NAME), &id)?;

    Ok(id)
}

fn check_sbatch_output(output: Output) -> crate::Result<Output> {
    let status = output.status;
    if !status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        return Err(classify_submit_failure(
            status.code().unwrap_or(-1),
            &stderr,
            &stdout,
        ));
    }
    Ok(output)
}

/// Distinguishes an outright descriptor rejection (bad account, unknown
/// partition, quota violation) from other sbatch failures.
fn classify_submit_failure(code: i32, stderr: &str, stdout: &str) -> LaunchError {
    const REJECTION_MARKERS: &[&str] = &[
        "invalid account",
        "invalid partition",
        "invalid qos",
        "unknown partition",
        "exceeds",
        "denied",
    ];
    let combined = format!("{stderr}\n{stdout}").to_lowercase();
    if REJECTION_MARKERS
        .iter()
        .any(|marker| combined.contains(marker))
    {
        LaunchError::ResourceRequestRejected(stderr.to_string())
    } else {
        LaunchError::GenericError(format!(
            "Exit code: {code}\nStderr: {stderr}\nStdout: {stdout}"
        ))
    }
}

fn parse_sbatch_job_id(output: &str) -> crate::Result<JobId> {
    output
        .lines()
        .map(|l| l.trim())
        .find(|l| l.to_lowercase().starts_with("submitted batch job"))
        .and_then(|l| l.split(' ').nth(3))
        .map(|l| l.to_string())
        .ok_or_else(|| {
            LaunchError::GenericError(format!("Missing job id in sbatch output\n{output}"))
        })
}
