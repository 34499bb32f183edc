/*!

This is the command line interface for creating and tearing down xstrapolate clusters.

!*/

mod config;
mod create;
mod get;
mod init;
mod install;
mod provider;
mod table;
mod teardown;
mod version;

use anyhow::Result;
use clap::Parser;
use config::Config;
use log::LevelFilter;
use std::path::PathBuf;

/// Stand up a Kubernetes cluster with the GitOps toolkit in a cloud account, and tear it down
/// again without leaving anything behind.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    /// Path to the config file. Defaults to `~/.xstrapolate.yaml`.
    #[clap(long = "config")]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Create a cluster, reusing whatever a previous attempt left behind.
    Create(create::Create),
    /// Delete every resource that belongs to a cluster.
    Teardown(teardown::Teardown),
    /// Show a cluster.
    Get(get::Get),
    /// Write a default config file.
    Init(init::Init),
    /// Print the version.
    Version(version::Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    cloud_utils::init_logger(env!("CARGO_CRATE_NAME"), Some(args.log_level));
    if let Err(e) = run(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = args.config;
    match args.command {
        Command::Init(init) => init.run(config_path.as_deref()),
        Command::Version(version) => {
            version.run();
            Ok(())
        }
        Command::Create(create) => {
            let config = Config::load(config_path.as_deref())?;
            let session = create.provider.connect(&config).await?;
            create.run(session, &config).await
        }
        Command::Teardown(teardown) => {
            teardown.confirm()?;
            let config = Config::load(config_path.as_deref())?;
            let session = teardown.provider.connect(&config).await?;
            teardown.run(session).await
        }
        Command::Get(get) => {
            let config = Config::load(config_path.as_deref())?;
            let session = get.provider.connect(&config).await?;
            get.run(session).await
        }
    }
}
