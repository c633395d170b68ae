use clap::Parser;

use switchq::client::commands::run::command_run;
use switchq::client::commands::submit::submit_job;
use switchq::common::cli::{RootOptions, SubCommand};
use switchq::common::setup::setup_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = RootOptions::parse();
    setup_logging(opts.common.debug);

    match opts.subcmd {
        SubCommand::Submit(opts) => submit_job(opts).await,
        SubCommand::Run(opts) => {
            let code = command_run(opts).await;
            std::process::exit(code);
        }
    }
}
