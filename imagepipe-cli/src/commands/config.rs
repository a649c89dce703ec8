//! Configuration management CLI commands.

use clap::Subcommand;
use std::path::Path;

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show,

    /// Show the configuration file path
    Path,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let (config, _) = load_config(config_path)?;
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Path => {
            let (_, path) = load_config(config_path)?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => run_init(config_path, force),
    }
}

fn run_init(config_path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let (config, path) = load_config(config_path)?;
    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }
    let config = if force { Default::default() } else { config };
    config.save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
