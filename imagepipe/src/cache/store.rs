//! Opaque keyed blob storage behind each cache tier.

use crate::cache::types::CacheError;
use crate::cache::CacheKey;
use bytes::Bytes;
use futures::future::BoxFuture;

/// Keyed byte storage used by a [`BufferedDiskCache`](crate::cache::BufferedDiskCache).
///
/// The persistence format is the store's own business; the cache only moves
/// whole values in and out.
pub trait BlobStore: Send + Sync {
    /// Reads a value. `Ok(None)` is a miss.
    fn get(&self, key: &CacheKey) -> BoxFuture<'_, Result<Option<Bytes>, CacheError>>;

    /// Stores a value, replacing any previous one.
    fn put(&self, key: &CacheKey, value: Bytes) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Cheap synchronous membership check.
    fn contains(&self, key: &CacheKey) -> bool;

    /// Removes a value; returns whether one existed.
    fn remove(&self, key: &CacheKey) -> BoxFuture<'_, Result<bool, CacheError>>;

    /// Removes every value.
    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
