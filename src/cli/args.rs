//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Bale - on-demand package bundling server
///
/// Serves registry packages as single-file browser-ready bundles,
/// building and caching each one on first request.
#[derive(Parser, Debug)]
#[command(name = "bale")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BALE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bundling server
    Serve(ServeArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Run one supervised build (spawned by the server, not for direct use)
    #[command(hide = true)]
    Worker,
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address, e.g. 0.0.0.0:9000
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Package registry base URL
    #[arg(long)]
    pub registry: Option<String>,

    /// Scratch directory for builds (reset on startup)
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Write a default config file if none exists
    #[arg(long)]
    pub init: bool,
}
