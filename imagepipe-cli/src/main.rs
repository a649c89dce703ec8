//! imagepipe CLI - Command-line interface
//!
//! Runs single requests through the image pipeline and manages its
//! configuration and disk caches.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "imagepipe")]
#[command(version = imagepipe::VERSION)]
#[command(about = "Fetch, cache and decode images through a producer pipeline", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.imagepipe/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one image, optionally decoding it
    Fetch(FetchArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage the disk caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, config_path).await,
        Commands::Config { command } => commands::config::run(command, config_path),
        Commands::Cache { action } => commands::cache::run(action, config_path).await,
    }
}
