use std::time::Duration;

use thiserror::Error;

use crate::common::error::LaunchError::GenericError;

/// Exit code reported when environment provisioning fails before the solver runs.
pub const EXIT_CODE_ENVIRONMENT: i32 = 102;
/// Exit code reported when the wall-clock limit terminates the solver.
pub const EXIT_CODE_TIMEOUT: i32 = 103;
/// Exit code reported when the scheduler refuses the submitted descriptor.
pub const EXIT_CODE_REJECTED: i32 = 104;
/// Exit code reported for any other internal failure.
pub const EXIT_CODE_INTERNAL: i32 = 105;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Environment error: {0}")]
    EnvironmentError(String),
    #[error("Wall-clock limit {limit:?} exceeded")]
    TimeoutError { limit: Duration },
    #[error("Cancelled by the scheduler or operator before the wall-clock limit")]
    Cancelled,
    #[error("Solver exited with code {0}")]
    SolverFailure(i32),
    #[error("Submission rejected by scheduler: {0}")]
    ResourceRequestRejected(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl LaunchError {
    /// Final process status for this failure. Solver exit codes propagate
    /// unchanged; the remaining variants map to reserved codes outside the
    /// solver's range so operators can tell an environment failure from a
    /// solver failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::SolverFailure(code) => *code,
            LaunchError::EnvironmentError(_) => EXIT_CODE_ENVIRONMENT,
            LaunchError::TimeoutError { .. } | LaunchError::Cancelled => EXIT_CODE_TIMEOUT,
            LaunchError::ResourceRequestRejected(_) => EXIT_CODE_REJECTED,
            LaunchError::IoError(_)
            | LaunchError::DeserializationError(_)
            | LaunchError::GenericError(_) => EXIT_CODE_INTERNAL,
        }
    }
}

impl From<anyhow::Error> for LaunchError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}

impl From<toml::de::Error> for LaunchError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

impl From<String> for LaunchError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}
