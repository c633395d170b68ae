use std::path::{Path, PathBuf};

use crate::Map;
use crate::common::error::LaunchError;
use crate::descriptor::EnvironmentSpec;
use crate::launcher::process::{ProcessInvocation, ProcessRunner};

/// Scoped handle over an activated execution environment.
///
/// Activations are applied in order through a single shell snippet and the
/// resulting variables are captured for the solver invocation. Deactivation
/// runs on every exit path: explicitly via [`ProvisionedEnv::teardown`] on
/// the normal paths, and from `Drop` as a backstop when the launcher is
/// cancelled or panics.
pub struct ProvisionedEnv {
    env: Map<String, String>,
    deactivation: Option<String>,
    cwd: PathBuf,
}

impl ProvisionedEnv {
    pub async fn provision(
        spec: &EnvironmentSpec,
        runner: &dyn ProcessRunner,
        cwd: &Path,
    ) -> Result<ProvisionedEnv, LaunchError> {
        let Some(activation) = spec.activation_snippet() else {
            return Ok(ProvisionedEnv {
                env: Map::new(),
                deactivation: None,
                cwd: cwd.to_path_buf(),
            });
        };

        log::info!("Provisioning environment: {activation}");
        let invocation = ProcessInvocation {
            args: vec![
                "bash".to_string(),
                "-c".to_string(),
                format!("{activation} && env -0"),
            ],
            cwd: cwd.to_path_buf(),
            env: Map::new(),
            capture_output: true,
            timelimit: None,
        };
        let outcome = runner
            .run(invocation)
            .await
            .map_err(|e| LaunchError::EnvironmentError(e.to_string()))?;
        if !outcome.success() {
            let detail = if outcome.stderr.trim().is_empty() {
                outcome.stdout.trim().to_string()
            } else {
                outcome.stderr.trim().to_string()
            };
            return Err(LaunchError::EnvironmentError(format!(
                "Activation exited with code {}: {}",
                outcome.exit_code(),
                detail
            )));
        }

        Ok(ProvisionedEnv {
            env: parse_env_dump(&outcome.stdout),
            deactivation: spec.deactivation_snippet(),
            cwd: cwd.to_path_buf(),
        })
    }

    /// Variables captured from the activated environment.
    pub fn env(&self) -> &Map<String, String> {
        &self.env
    }

    /// Deactivates the environment. Failures are logged, never propagated:
    /// the solver's result must not be masked by teardown problems.
    pub async fn teardown(mut self, runner: &dyn ProcessRunner) {
        let Some(snippet) = self.deactivation.take() else {
            return;
        };
        let invocation = ProcessInvocation {
            args: vec!["bash".to_string(), "-c".to_string(), snippet],
            cwd: self.cwd.clone(),
            env: Map::new(),
            capture_output: true,
            timelimit: None,
        };
        match runner.run(invocation).await {
            Ok(outcome) if !outcome.success() => {
                log::warn!(
                    "Environment deactivation exited with code {}",
                    outcome.exit_code()
                );
            }
            Ok(_) => log::debug!("Environment deactivated"),
            Err(e) => log::warn!("Environment deactivation failed: {e}"),
        }
    }
}

impl Drop for ProvisionedEnv {
    fn drop(&mut self) {
        if let Some(snippet) = self.deactivation.take() {
            log::warn!("Environment dropped without explicit teardown, deactivating");
            let _ = std::process::Command::new("bash")
                .arg("-c")
                .arg(snippet)
                .current_dir(&self.cwd)
                .status();
        }
    }
}

/// Parses the NUL-separated output of `env -0`.
fn parse_env_dump(stdout: &str) -> Map<String, String> {
    stdout
        .split('\0')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
