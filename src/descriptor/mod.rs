pub mod script;

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nom::character::complete::one_of;
use nom::combinator::map;
use nom::sequence::tuple;
use serde::{Deserialize, Deserializer};

use crate::common::parser::{NomResult, consume_all, p_u64};
use crate::common::timeutils::parse_walltime;

/// Default solver executable; the capacity-expansion model is solved by
/// invoking `switch solve` with a fixed flag set.
pub const DEFAULT_SOLVER_PROGRAM: &str = "switch";

/// Complete submission-time description of one solver run, deserialized once
/// from a TOML job file and immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDescriptor {
    pub resources: ResourceRequest,
    #[serde(default)]
    pub notifications: NotificationPolicy,
    #[serde(default)]
    pub logs: LogTargets,
    #[serde(default)]
    pub environment: EnvironmentSpec,
    pub solver: SolverInvocation,
    /// Directory the solver runs in; defaults to the submission directory.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Whether the submitting shell's environment propagates into the job.
    #[serde(default = "default_true")]
    pub export_env: bool,
}

impl JobDescriptor {
    pub fn load(path: &Path) -> crate::Result<JobDescriptor> {
        let content = std::fs::read_to_string(path)?;
        let descriptor: JobDescriptor = toml::from_str(&content)?;
        descriptor
            .validate()
            .map_err(|e| crate::Error::GenericError(e.to_string()))?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let r = &self.resources;
        if r.job_name.is_empty() {
            anyhow::bail!("Job name must not be empty");
        }
        if r.nodes == 0 || r.tasks_per_node == 0 || r.cpus_per_task == 0 {
            anyhow::bail!("Node, task and CPU counts must be at least 1");
        }
        if r.timelimit.is_zero() {
            anyhow::bail!("Wall-clock limit must be positive");
        }
        if self.notifications.mailto.is_none() && !self.notifications.events.is_empty() {
            log::warn!("Notification events configured without a recipient address");
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceRequest {
    pub job_name: String,
    pub account: String,
    pub partition: String,
    #[serde(deserialize_with = "deserialize_walltime")]
    pub timelimit: Duration,
    #[serde(default = "default_count")]
    pub nodes: u32,
    #[serde(default = "default_count")]
    pub tasks_per_node: u32,
    #[serde(default = "default_count")]
    pub cpus_per_task: u32,
    pub mem_per_cpu: MemPerCpu,
}

fn default_count() -> u32 {
    1
}

fn deserialize_walltime<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    parse_walltime(&buf).map_err(serde::de::Error::custom)
}

/// Per-core memory ceiling, e.g. `20G`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct MemPerCpu {
    amount: u64,
    unit: char,
}

impl MemPerCpu {
    pub fn parse(input: &str) -> anyhow::Result<MemPerCpu> {
        consume_all(p_mem_per_cpu, input)
    }
}

fn p_mem_per_cpu(input: &str) -> NomResult<MemPerCpu> {
    map(tuple((p_u64, one_of("KMGT"))), |(amount, unit)| MemPerCpu {
        amount,
        unit,
    })(input)
}

impl TryFrom<String> for MemPerCpu {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MemPerCpu::parse(&value).map_err(|e| e.to_string())
    }
}

impl Display for MemPerCpu {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Begin,
    End,
    Fail,
    All,
}

impl NotifyEvent {
    pub fn as_directive(&self) -> &'static str {
        match self {
            NotifyEvent::Begin => "BEGIN",
            NotifyEvent::End => "END",
            NotifyEvent::Fail => "FAIL",
            NotifyEvent::All => "ALL",
        }
    }
}

/// Purely informational to the scheduler; rendered only when non-empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationPolicy {
    #[serde(default)]
    pub events: Vec<NotifyEvent>,
    #[serde(default)]
    pub mailto: Option<String>,
}

/// Stdout/stderr path templates. `%{JOB_ID}`, `%{JOB_NAME}` and
/// `%{SUBMIT_DIR}` are resolved once the scheduler assigns a job id, so two
/// submissions never write into the same files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogTargets {
    #[serde(default = "default_stdout")]
    pub stdout: PathBuf,
    #[serde(default = "default_stderr")]
    pub stderr: PathBuf,
}

impl Default for LogTargets {
    fn default() -> Self {
        LogTargets {
            stdout: default_stdout(),
            stderr: default_stderr(),
        }
    }
}

fn default_stdout() -> PathBuf {
    PathBuf::from("%{JOB_NAME}-%{JOB_ID}.out")
}

fn default_stderr() -> PathBuf {
    PathBuf::from("%{JOB_NAME}-%{JOB_ID}.err")
}

/// Ordered environment activations applied before the solver starts.
/// Later activations may shadow earlier ones, so the order is preserved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub virtualenv: Option<PathBuf>,
    #[serde(default)]
    pub pip_install: Vec<String>,
}

impl EnvironmentSpec {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.virtualenv.is_none() && self.pip_install.is_empty()
    }

    /// Shell snippet that applies all activations in order.
    pub fn activation_snippet(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut steps: Vec<String> = self
            .modules
            .iter()
            .map(|module| format!("module load {module}"))
            .collect();
        if let Some(venv) = &self.virtualenv {
            steps.push(format!("source {}/bin/activate", venv.display()));
        }
        if !self.pip_install.is_empty() {
            steps.push(format!("pip install {}", self.pip_install.join(" ")));
        }
        Some(steps.join(" && "))
    }

    /// Shell snippet that deactivates the environment. Each step is guarded
    /// so that teardown succeeds even when an activation never happened.
    pub fn deactivation_snippet(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut steps = Vec::new();
        if self.virtualenv.is_some() {
            steps.push("type deactivate >/dev/null 2>&1 && deactivate".to_string());
        }
        if !self.modules.is_empty() {
            steps.push("type module >/dev/null 2>&1 && module purge".to_string());
        }
        steps.push("true".to_string());
        Some(steps.join("; "))
    }
}

/// The single external solver call. The flags are opaque to the launcher and
/// rendered in a fixed order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverInvocation {
    #[serde(default = "default_solver_program")]
    pub program: String,
    pub backend: String,
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub log_run: bool,
    #[serde(default = "default_true")]
    pub export_all: bool,
    #[serde(default)]
    pub solver_io: Option<String>,
    #[serde(default)]
    pub solver_options: Option<String>,
    #[serde(default)]
    pub suffixes: Vec<String>,
    /// Ask the solver for IIS (irreducible-infeasible-subset) diagnostics:
    /// a minimal infeasible constraint set instead of a plain infeasibility
    /// verdict. Implied defaults can be overridden by the explicit
    /// `solver_io`/`solver_options`/`suffixes` fields.
    #[serde(default)]
    pub iis: bool,
}

fn default_solver_program() -> String {
    DEFAULT_SOLVER_PROGRAM.to_string()
}

impl SolverInvocation {
    pub fn new(backend: &str) -> SolverInvocation {
        SolverInvocation {
            program: default_solver_program(),
            backend: backend.to_string(),
            verbose: true,
            log_run: true,
            export_all: true,
            solver_io: None,
            solver_options: None,
            suffixes: Vec::new(),
            iis: false,
        }
    }

    /// Enables IIS diagnostics; equivalent to `iis = true` in the job file.
    pub fn with_iis(mut self) -> SolverInvocation {
        self.iis = true;
        self
    }

    /// Argument vector passed to the solver executable, without the program
    /// name itself.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["solve".to_string()];
        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.log_run {
            args.push("--log-run".to_string());
        }
        args.push(format!("--solver={}", self.backend));
        if self.export_all {
            args.push("--export-all".to_string());
        }
        if let Some(io) = self.solver_io.as_deref().or(self.iis.then_some("nl")) {
            args.push(format!("--solver-io={io}"));
        }
        if let Some(options) = self
            .solver_options
            .as_deref()
            .or(self.iis.then_some("iisfind=1"))
        {
            args.push(format!("--solver-options-string={options}"));
        }
        for suffix in &self.suffixes {
            args.push("--suffixes".to_string());
            args.push(suffix.clone());
        }
        if self.iis && !self.suffixes.iter().any(|suffix| suffix == "iis") {
            args.push("--suffixes".to_string());
            args.push("iis".to_string());
        }
        args
    }

    /// Human-readable command line, with the options string quoted the way it
    /// would be written in a shell.
    pub fn render(&self) -> String {
        let mut command = self.program.clone();
        for arg in self.build_args() {
            command.push(' ');
            match arg.strip_prefix("--solver-options-string=") {
                Some(options) => {
                    command.push_str(&format!("--solver-options-string=\"{options}\""))
                }
                None => command.push_str(&arg),
            }
        }
        command
    }
}
