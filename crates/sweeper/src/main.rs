//! sweeper - stale account cleanup for shared-use workstations
//!
//! This is the main entry point. It wires together:
//! - Configuration loading
//! - The macOS collaborators behind a bounded-timeout executor
//! - The record store, run engine, session tracker and remediation tasks

mod cli;
mod commands;
mod report;

use clap::Parser;
use std::process::ExitCode;
use sweeper_config::ConfigError;
use sweeper_util::SweepError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Process exit status for a failed invocation
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<SweepError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    1
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "sweeper starting");

    match commands::dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "sweeper failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
