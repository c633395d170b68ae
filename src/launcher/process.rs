use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::Map;
use crate::common::error::LaunchError;

/// A single external command: argument vector, working directory, extra
/// environment and an optional wall-clock bound.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Map<String, String>,
    /// Capture stdout/stderr into the outcome instead of inheriting the
    /// surrounding job's log files.
    pub capture_output: bool,
    pub timelimit: Option<Duration>,
}

/// Structured result of a finished external process.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// Swappable process-invocation interface. The launcher only talks to
/// external programs through this trait, so tests can substitute a stub.
pub trait ProcessRunner {
    fn run(
        &self,
        invocation: ProcessInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutcome, LaunchError>> + '_>>;
}

/// Real runner backed by `tokio::process`.
pub struct TokioRunner;

impl ProcessRunner for TokioRunner {
    fn run(
        &self,
        invocation: ProcessInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessOutcome, LaunchError>> + '_>> {
        Box::pin(async move {
            if invocation.args.is_empty() {
                return Err(LaunchError::GenericError(
                    "No command arguments".to_string(),
                ));
            }

            let mut command = Command::new(&invocation.args[0]);
            command.args(&invocation.args[1..]);
            command.current_dir(&invocation.cwd);
            // If the wall-clock limit cancels the wait below, dropping the
            // future must take the process down with it.
            command.kill_on_drop(true);
            for (key, value) in &invocation.env {
                command.env(key, value);
            }

            log::debug!("Running command `{}`", invocation.args.join(" "));
            let start = Instant::now();
            if invocation.capture_output {
                let output = bounded(invocation.timelimit, command.output()).await??;
                Ok(ProcessOutcome {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    elapsed: start.elapsed(),
                })
            } else {
                let status: ExitStatus = bounded(invocation.timelimit, command.status()).await??;
                Ok(ProcessOutcome {
                    code: status.code(),
                    stdout: String::new(),
                    stderr: String::new(),
                    elapsed: start.elapsed(),
                })
            }
        })
    }
}

async fn bounded<T, F>(timelimit: Option<Duration>, future: F) -> Result<T, LaunchError>
where
    F: Future<Output = T>,
{
    match timelimit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| LaunchError::TimeoutError { limit }),
        None => Ok(future.await),
    }
}
