//! Bale - on-demand package bundling server
//!
//! CLI entry point that dispatches to subcommands.

use bale::cli::{Cli, Commands};
use bale::config::ConfigManager;
use bale::error::BaleResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BaleResult<()> {
    let cli = Cli::parse();

    // Workers speak the supervisor protocol on stdout and get their
    // settings over the wire; no config or logging setup applies.
    if matches!(cli.command, Commands::Worker) {
        return bale::cli::commands::worker().await;
    }

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    match cli.command {
        Commands::Worker => unreachable!("handled above"),
        Commands::Serve(args) => {
            let config = config_manager.load().await?;
            bale::cli::commands::serve(args, config, cli.verbose).await
        }
        Commands::Config(args) => bale::cli::commands::config(args, &config_manager).await,
    }
}
