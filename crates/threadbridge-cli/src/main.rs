//! threadbridge - keeps support tickets and their chat threads in sync
//!
//! Runs the sweep scheduler as a long-lived process, or drives single
//! passes and lifecycle sweeps by hand.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::check::run_check;
use crate::commands::common::load_config;
use crate::commands::lifecycle::{run_dusty, run_recycle};
use crate::commands::run::run_bridge;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    // Only load .env in development; deployments inject the environment.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("threadbridge=info".parse().expect("valid directive"))
                .add_directive("threadbridge_core=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config()?;

    match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Check => run_check(&config).await,
        Commands::Sync {
            ticket,
            thread,
            repair,
        } => run_sync(config, ticket, thread, repair).await,
        Commands::Dusty { dry_run, json } => run_dusty(config, dry_run, json).await,
        Commands::Recycle { dry_run, json } => run_recycle(config, dry_run, json).await,
    }
}
