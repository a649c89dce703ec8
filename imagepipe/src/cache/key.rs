//! Cache keys and their derivation from requests.

use crate::producers::ImageRequest;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Identifies one cacheable encoded image.
///
/// Cheap to clone; equality and hashing use the key string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable, filesystem-safe identifier: lowercase SHA-256 hex of the key.
    pub fn resource_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps requests to the keys their encoded bytes are cached under.
pub trait CacheKeyFactory: Send + Sync {
    fn encoded_cache_key(&self, request: &ImageRequest) -> CacheKey;
}

/// Keys encoded images by their source URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCacheKeyFactory;

impl CacheKeyFactory for DefaultCacheKeyFactory {
    fn encoded_cache_key(&self, request: &ImageRequest) -> CacheKey {
        CacheKey::new(request.source_uri())
    }
}
