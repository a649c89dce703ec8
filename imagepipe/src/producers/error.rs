//! Error types for the producer chain.
//!
//! Each stage translates the faults of the layer below it into a
//! [`PipelineError`] exactly once; consumers only ever see that type.

use crate::decoder::DecodeError;
use crate::memory::PoolError;
use crate::references::HandleError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from local byte sources.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A `data:` URI without the `,` separating header and payload
    #[error("malformed data URI: {0}")]
    MalformedDataUri(String),

    /// Base-64 payload of a `data:` URI did not decode
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Reading a local file failed
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No buffer available for the fetched bytes
    #[error("buffer unavailable: {0}")]
    Pool(#[from] PoolError),
}

/// Failure delivered to a consumer.
///
/// Cloneable so it can be fanned out to listeners and consumers alike.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(Arc<FetchError>),

    #[error("decode failed: {0}")]
    Decode(Arc<DecodeError>),

    #[error("buffer pool error: {0}")]
    Pool(PoolError),

    #[error("resource lifetime violation: {0}")]
    Lifetime(HandleError),

    #[error("unsupported source URI: {0}")]
    UnsupportedUri(String),

    /// Internal error (e.g., channel closed unexpectedly)
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FetchError> for PipelineError {
    fn from(e: FetchError) -> Self {
        PipelineError::Fetch(Arc::new(e))
    }
}

impl From<DecodeError> for PipelineError {
    fn from(e: DecodeError) -> Self {
        PipelineError::Decode(Arc::new(e))
    }
}

impl From<PoolError> for PipelineError {
    fn from(e: PoolError) -> Self {
        PipelineError::Pool(e)
    }
}

impl From<HandleError> for PipelineError {
    fn from(e: HandleError) -> Self {
        PipelineError::Lifetime(e)
    }
}
