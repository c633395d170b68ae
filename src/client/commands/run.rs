use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};

use crate::common::error::LaunchError;
use crate::descriptor::JobDescriptor;
use crate::launcher::process::TokioRunner;
use crate::launcher::run_job;

#[derive(Parser)]
pub struct JobRunOpts {
    /// TOML job file this allocation was submitted from
    #[arg(long)]
    pub job_file: PathBuf,
}

/// In-allocation entry point. Returns the process status to exit with: the
/// solver's own exit code, or one of the reserved failure codes.
pub async fn command_run(opts: JobRunOpts) -> i32 {
    match run_inner(opts).await {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{e}");
            e.exit_code()
        }
    }
}

async fn run_inner(opts: JobRunOpts) -> Result<(), LaunchError> {
    let descriptor = JobDescriptor::load(&opts.job_file)?;
    let submit_dir = std::env::current_dir()?;
    let limit = descriptor.resources.timelimit;

    // SLURM delivers SIGTERM both when the wall-clock limit expires and on
    // `scancel`. Cancelling the launch here drops the environment guard,
    // which performs the teardown that the signal would otherwise skip.
    let mut sigterm = signal(SignalKind::terminate())?;
    let started = Instant::now();

    let outcome = tokio::select! {
        result = run_job(&descriptor, &TokioRunner, &submit_dir) => result?,
        _ = sigterm.recv() => {
            return Err(classify_interrupt(started.elapsed(), limit));
        }
    };

    log::info!(
        "Solver finished successfully in {}",
        humantime::format_duration(outcome.elapsed)
    );
    Ok(())
}

/// A SIGTERM at or past the wall-clock limit is a timeout; anything earlier
/// is an external cancellation (e.g. `scancel`).
fn classify_interrupt(elapsed: Duration, limit: Duration) -> LaunchError {
    if elapsed >= limit {
        LaunchError::TimeoutError { limit }
    } else {
        LaunchError::Cancelled
    }
}
