use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::common::timeutils::parse_walltime;
use crate::descriptor::JobDescriptor;
use crate::scheduler::Scheduler;
use crate::scheduler::slurm::SlurmScheduler;

#[derive(Parser)]
pub struct JobSubmitOpts {
    /// TOML job file describing resources, environment and the solver call
    #[arg(long)]
    pub job_file: PathBuf,

    /// Override the wall-clock limit from the job file (`HH:MM:SS` or humantime)
    #[arg(long, value_parser = parse_walltime)]
    pub walltime: Option<Duration>,

    /// Print the rendered submit script instead of submitting it
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn submit_job(opts: JobSubmitOpts) -> anyhow::Result<()> {
    let job_file = std::path::absolute(&opts.job_file)
        .with_context(|| format!("Cannot resolve job file {}", opts.job_file.display()))?;
    let mut descriptor = JobDescriptor::load(&job_file)?;
    if let Some(walltime) = opts.walltime {
        descriptor.resources.timelimit = walltime;
    }

    // The solver usually only exists on the compute nodes, so a missing
    // binary on the login node is informational.
    if which::which(&descriptor.solver.program).is_err() {
        log::warn!(
            "Solver executable `{}` not found in PATH on this node",
            descriptor.solver.program
        );
    }

    let submit_dir = std::env::current_dir()?;
    let mut scheduler = SlurmScheduler::new(submit_dir, job_file)?;

    if opts.dry_run {
        println!("{}", scheduler.render_script(&descriptor));
        return Ok(());
    }

    let job = scheduler.submit(&descriptor).await?;
    log::info!(
        "Submitted job {} (stdout: {}, stderr: {})",
        job.id,
        job.stdout.display(),
        job.stderr.display()
    );
    println!("{}", job.id);
    Ok(())
}
