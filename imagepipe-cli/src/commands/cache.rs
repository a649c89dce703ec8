//! Disk cache management CLI commands.

use clap::Subcommand;
use imagepipe::pipeline::ImagePipelineBuilder;
use std::path::Path;

use super::common::{load_config, start_logging};
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove every entry from both disk cache tiers
    Clear,
}

/// Run a cache subcommand.
pub async fn run(action: CacheAction, config_path: Option<&Path>) -> Result<(), CliError> {
    let (config, _) = load_config(config_path)?;
    let _logging = start_logging(&config)?;

    match action {
        CacheAction::Clear => {
            println!("Clearing disk caches:");
            println!("  default: {}", config.cache.directory.display());
            println!("  small:   {}", config.cache.small_directory.display());

            let pipeline =
                ImagePipelineBuilder::from_config(&config, tokio::runtime::Handle::current())?
                    .build();
            pipeline
                .clear_disk_caches()
                .await
                .map_err(CliError::CacheClear)?;
            println!("Done");
            Ok(())
        }
    }
}
