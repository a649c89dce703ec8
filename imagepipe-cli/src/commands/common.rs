//! Helpers shared across CLI commands.

use imagepipe::config::{config_file_path, ConfigFile};
use imagepipe::logging::{init_logging, LoggingGuard};
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Loads the config file at `path`, or the default location.
///
/// A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<(ConfigFile, PathBuf), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;
    Ok((config, path))
}

/// Starts file and console logging per the config's `[logging]` section.
pub fn start_logging(config: &ConfigFile) -> Result<LoggingGuard, CliError> {
    init_logging(&config.logging).map_err(|e| CliError::LoggingInit(e.to_string()))
}
