//! Sepsel CLI - pipeline stages for learned separator configuration
//!
//! Four subcommands, one per stage: build the restricted action set,
//! train the policy, replay it against a collected trace, or evaluate
//! it live against the solver.

mod actionset;
mod offline;
mod online;
mod solver;
mod train;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sepsel", version, about = "Learned separator-configuration policies for MIP solving")]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the restricted action set from a timing trace
    BuildActionSet(actionset::BuildActionSetArgs),
    /// Train the instance -> configuration classifier
    Train(train::TrainArgs),
    /// Replay predictions against a collected trace (no new solves)
    EvalOffline(offline::EvalOfflineArgs),
    /// Evaluate the trained policy with live solver runs
    EvalOnline(online::EvalOnlineArgs),
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::BuildActionSet(args) => actionset::run(args),
        Command::Train(args) => train::run(args),
        Command::EvalOffline(args) => offline::run(args),
        Command::EvalOnline(args) => online::run(args),
    }
}
