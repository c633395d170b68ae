use clap::Parser;

use crate::client::commands::run::JobRunOpts;
use crate::client::commands::submit::JobSubmitOpts;

#[derive(Parser)]
#[command(
    name = "switchq",
    version = crate::SWITCHQ_VERSION,
    about = "Submits capacity-expansion solver runs to a SLURM cluster and launches them inside the allocation"
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub struct CommonOpts {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Render a submit script from a job file and submit it through `sbatch`
    Submit(JobSubmitOpts),
    /// Launch a job inside an allocation: provision the environment, run the
    /// solver, tear down, propagate the exit code
    Run(JobRunOpts),
}
