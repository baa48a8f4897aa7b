/*!

This is the command line interface for running an e2e suite against an ephemeral management
cluster: create the cluster, install controller components, validate and watch their workloads,
and tear everything down.

!*/

mod run;
mod teardown;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

/// The command line interface for provisioning an ephemeral management cluster and validating
/// controller components on it.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Run a full suite lifecycle: set up, validate, and tear down.
    Run(run::Run),
    /// Delete a management cluster left behind by an aborted run.
    Teardown(teardown::Teardown),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Run(run) => run.run().await,
        Command::Teardown(teardown) => teardown.run().await,
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("clustertest_harness"), level)
                .init();
        }
    }
}
