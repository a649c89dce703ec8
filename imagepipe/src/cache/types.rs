//! Error type for the cache layer.

use crate::memory::PoolError;
use crate::references::HandleError;
use thiserror::Error;

/// Cache-related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during blob store operations
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No pooled buffer for the bytes read back from a store
    #[error("Cache buffer unavailable: {0}")]
    Pool(#[from] PoolError),

    /// The image to be written was already released
    #[error("Cached image already released: {0}")]
    Handle(#[from] HandleError),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}
