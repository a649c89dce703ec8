//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use imagepipe::cache::CacheError;
use imagepipe::config::ConfigFileError;
use imagepipe::pipeline::BuildError;
use imagepipe::producers::PipelineError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration could not be read or written
    Config(ConfigFileError),
    /// Pipeline could not be assembled from configuration
    Build(BuildError),
    /// Request failed in the pipeline
    Request(PipelineError),
    /// Request was cancelled (usually by `--timeout-ms`)
    Cancelled { uri: String },
    /// Request completed without an image
    NoResult { uri: String },
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
    /// Failed to clear a disk cache
    CacheClear(CacheError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Build(BuildError::Cache(_)) => {
                eprintln!();
                eprintln!("Check the [cache] section of your config file:");
                eprintln!("  1. directory and small_directory must differ");
                eprintln!("  2. both must be writable");
            }
            CliError::NoResult { .. } => {
                eprintln!();
                eprintln!("The request stopped at the disk cache and nothing was cached.");
                eprintln!("Drop --cache-only to fetch from the source.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Build(e) => write!(f, "Failed to build pipeline: {}", e),
            CliError::Request(e) => write!(f, "Request failed: {}", e),
            CliError::Cancelled { uri } => write!(f, "Request for '{}' was cancelled", uri),
            CliError::NoResult { uri } => write!(f, "No image available for '{}'", uri),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
            CliError::CacheClear(e) => write!(f, "Failed to clear disk cache: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Build(e) => Some(e),
            CliError::Request(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::CacheClear(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::Build(e)
    }
}
