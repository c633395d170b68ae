pub mod environment;
pub mod process;

use std::path::Path;

use chrono::{DateTime, Local};

use crate::Map;
use crate::common::env::{
    SLURM_JOB_ID, SWITCHQ_ENV_ACTIVE, SWITCHQ_JOB_ID, SWITCHQ_JOB_NAME, SWITCHQ_SUBMIT_DIR,
};
use crate::common::error::LaunchError;
use crate::descriptor::JobDescriptor;
use crate::launcher::environment::ProvisionedEnv;
use crate::launcher::process::{ProcessInvocation, ProcessOutcome, ProcessRunner};

/// Run metadata written next to the job logs.
pub const RUN_INFO_FILE_NAME: &str = "run-info.txt";

/// Executes one job inside an allocation: provision the environment, run the
/// solver once bounded by the wall-clock limit, tear the environment down on
/// every path, and report the solver's own exit status untouched.
pub async fn run_job(
    descriptor: &JobDescriptor,
    runner: &dyn ProcessRunner,
    submit_dir: &Path,
) -> Result<ProcessOutcome, LaunchError> {
    let started = Local::now();
    let env = ProvisionedEnv::provision(&descriptor.environment, runner, submit_dir).await?;

    log::info!("Running solver command `{}`", descriptor.solver.render());
    let result = runner
        .run(solver_invocation(descriptor, &env, submit_dir))
        .await;
    env.teardown(runner).await;

    let result = match result {
        Ok(outcome) if outcome.success() => Ok(outcome),
        Ok(outcome) => Err(LaunchError::SolverFailure(outcome.exit_code())),
        Err(e) => Err(e),
    };
    write_run_info(submit_dir, descriptor, started, &result);
    result
}

fn solver_invocation(
    descriptor: &JobDescriptor,
    env: &ProvisionedEnv,
    submit_dir: &Path,
) -> ProcessInvocation {
    let mut solver_env: Map<String, String> = env.env().clone();
    solver_env.insert(SWITCHQ_ENV_ACTIVE.to_string(), "1".to_string());
    solver_env.insert(
        SWITCHQ_JOB_NAME.to_string(),
        descriptor.resources.job_name.clone(),
    );
    solver_env.insert(
        SWITCHQ_SUBMIT_DIR.to_string(),
        submit_dir.to_string_lossy().into_owned(),
    );
    if let Ok(job_id) = std::env::var(SLURM_JOB_ID) {
        solver_env.insert(SWITCHQ_JOB_ID.to_string(), job_id);
    }

    let mut args = vec![descriptor.solver.program.clone()];
    args.extend(descriptor.solver.build_args());

    ProcessInvocation {
        args,
        cwd: descriptor
            .workdir
            .clone()
            .unwrap_or_else(|| submit_dir.to_path_buf()),
        env: solver_env,
        // The allocation's log files already capture solver output.
        capture_output: false,
        timelimit: Some(descriptor.resources.timelimit),
    }
}

fn write_run_info(
    submit_dir: &Path,
    descriptor: &JobDescriptor,
    started: DateTime<Local>,
    result: &Result<ProcessOutcome, LaunchError>,
) {
    let status = match result {
        Ok(_) => "exit code 0".to_string(),
        Err(e) => e.to_string(),
    };
    let content = format!(
        "host: {}\nstarted: {}\nfinished: {}\ncommand: {}\nstatus: {}\n",
        gethostname::gethostname().to_string_lossy(),
        started.format("%Y-%m-%d %H:%M:%S"),
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        descriptor.solver.render(),
        status
    );
    if let Err(e) = std::fs::write(submit_dir.join(RUN_INFO_FILE_NAME), content) {
        log::warn!("Cannot write {RUN_INFO_FILE_NAME}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use super::{RUN_INFO_FILE_NAME, run_job};
    use crate::Map;
    use crate::common::env::{SWITCHQ_ENV_ACTIVE, SWITCHQ_JOB_NAME};
    use crate::common::error::LaunchError;
    use crate::descriptor::JobDescriptor;
    use crate::launcher::process::{ProcessInvocation, ProcessOutcome, ProcessRunner};

    /// Records every invocation and replays canned outcomes in order.
    struct StubRunner {
        invocations: RefCell<Vec<ProcessInvocation>>,
        responses: RefCell<VecDeque<Result<ProcessOutcome, LaunchError>>>,
    }

    impl StubRunner {
        fn new(responses: Vec<Result<ProcessOutcome, LaunchError>>) -> StubRunner {
            StubRunner {
                invocations: RefCell::new(Vec::new()),
                responses: RefCell::new(responses.into()),
            }
        }

        fn invocations(&self) -> Vec<ProcessInvocation> {
            self.invocations.borrow().clone()
        }
    }

    impl ProcessRunner for StubRunner {
        fn run(
            &self,
            invocation: ProcessInvocation,
        ) -> Pin<Box<dyn Future<Output = Result<ProcessOutcome, LaunchError>> + '_>> {
            self.invocations.borrow_mut().push(invocation);
            let response = self
                .responses
                .borrow_mut()
                .pop_front()
                .expect("Unexpected invocation");
            Box::pin(async move { response })
        }
    }

    fn outcome(code: i32, stdout: &str, stderr: &str) -> Result<ProcessOutcome, LaunchError> {
        Ok(ProcessOutcome {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            elapsed: Duration::from_millis(1),
        })
    }

    fn descriptor(with_environment: bool) -> JobDescriptor {
        let environment = if with_environment {
            r#"
            [environment]
            modules = ["python/3.7", "gurobi"]
            virtualenv = "/home/user/venv"
            "#
        } else {
            ""
        };
        toml::from_str(&format!(
            r#"
            [resources]
            job_name = "switch-base"
            account = "def-energy"
            partition = "cpu"
            timelimit = "10:00:00"
            cpus_per_task = 12
            mem_per_cpu = "20G"
            {environment}
            [solver]
            backend = "cplexamp"
            "#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_solver_exit_code_propagates_exactly_once() {
        let runner = StubRunner::new(vec![outcome(3, "", "")]);
        let workdir = tempfile::tempdir().unwrap();

        let err = run_job(&descriptor(false), &runner, workdir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::SolverFailure(3)));
        assert_eq!(err.exit_code(), 3);

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].args,
            vec![
                "switch",
                "solve",
                "--verbose",
                "--log-run",
                "--solver=cplexamp",
                "--export-all"
            ]
        );
    }

    #[tokio::test]
    async fn test_environment_failure_short_circuits_solver() {
        let runner = StubRunner::new(vec![outcome(1, "", "module: command not found")]);
        let workdir = tempfile::tempdir().unwrap();

        let err = run_job(&descriptor(true), &runner, workdir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::EnvironmentError(_)));

        // Only the activation attempt ran; the solver was never invoked.
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert!(invocations[0].args[2].contains("module load python/3.7"));
    }

    #[tokio::test]
    async fn test_successful_run_uses_captured_environment() {
        let runner = StubRunner::new(vec![
            outcome(0, "PATH=/venv/bin:/usr/bin\0VIRTUAL_ENV=/home/user/venv\0", ""),
            outcome(0, "", ""),
            outcome(0, "", ""),
        ]);
        let workdir = tempfile::tempdir().unwrap();

        run_job(&descriptor(true), &runner, workdir.path())
            .await
            .unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 3);
        let solver = &invocations[1];
        assert_eq!(solver.env["VIRTUAL_ENV"], "/home/user/venv");
        assert_eq!(solver.env[SWITCHQ_ENV_ACTIVE], "1");
        assert_eq!(solver.env[SWITCHQ_JOB_NAME], "switch-base");
        assert_eq!(
            solver.timelimit,
            Some(Duration::from_secs(10 * 3600))
        );
        assert!(!solver.capture_output);
    }

    #[tokio::test]
    async fn test_teardown_runs_after_solver_failure() {
        let runner = StubRunner::new(vec![
            outcome(0, "VIRTUAL_ENV=/home/user/venv\0", ""),
            outcome(3, "", ""),
            outcome(0, "", ""),
        ]);
        let workdir = tempfile::tempdir().unwrap();

        let err = run_job(&descriptor(true), &runner, workdir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::SolverFailure(3)));

        // The deactivation invocation must have run despite the failure.
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 3);
        assert!(invocations[2].args[2].contains("deactivate"));
    }

    #[tokio::test]
    async fn test_teardown_runs_after_timeout() {
        let runner = StubRunner::new(vec![
            outcome(0, "VIRTUAL_ENV=/home/user/venv\0", ""),
            Err(LaunchError::TimeoutError {
                limit: Duration::from_secs(36000),
            }),
            outcome(0, "", ""),
        ]);
        let workdir = tempfile::tempdir().unwrap();

        let err = run_job(&descriptor(true), &runner, workdir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::TimeoutError { .. }));
        assert_eq!(runner.invocations().len(), 3);
    }

    #[tokio::test]
    async fn test_run_info_is_written() {
        let runner = StubRunner::new(vec![outcome(0, "", "")]);
        let workdir = tempfile::tempdir().unwrap();

        run_job(&descriptor(false), &runner, workdir.path())
            .await
            .unwrap();

        let info = std::fs::read_to_string(workdir.path().join(RUN_INFO_FILE_NAME)).unwrap();
        assert!(info.contains("command: switch solve"));
        assert!(info.contains("status: exit code 0"));
    }
}
