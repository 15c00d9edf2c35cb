//! Config command - show or initialize configuration

use crate::cli::args::ConfigArgs;
use crate::config::{Config, ConfigManager};
use crate::error::BaleResult;

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager) -> BaleResult<()> {
    if args.init {
        if manager.path().exists() {
            println!("config already exists at {}", manager.path().display());
        } else {
            manager.save(&Config::default()).await?;
            println!("wrote default config to {}", manager.path().display());
        }
        return Ok(());
    }

    // resolved view: file contents merged over defaults
    let config = manager.load().await?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
