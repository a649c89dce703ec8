//! In-memory blob store.

use crate::cache::types::CacheError;
use crate::cache::{BlobStore, CacheKey};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Blob store holding values in a concurrent map.
///
/// Useful as a cache tier in tests and for short-lived processes. Nothing is
/// ever evicted implicitly.
#[derive(Debug)]
pub struct MemoryBlobStore {
    name: String,
    entries: DashMap<CacheKey, Bytes>,
    size_bytes: AtomicUsize,
}

impl MemoryBlobStore {
    /// Create an empty store.
    ///
    /// # Arguments
    ///
    /// * `name` - Tier name used in logs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            size_bytes: AtomicUsize::new(0),
        }
    }

    /// Get the current number of entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Get the total size of stored values in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    fn insert(&self, key: CacheKey, value: Bytes) {
        let added = value.len();
        if let Some(previous) = self.entries.insert(key, value) {
            self.size_bytes.fetch_sub(previous.len(), Ordering::Relaxed);
        }
        self.size_bytes.fetch_add(added, Ordering::Relaxed);
    }

    fn evict(&self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some((_, value)) => {
                self.size_bytes.fetch_sub(value.len(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &CacheKey) -> BoxFuture<'_, Result<Option<Bytes>, CacheError>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn put(&self, key: &CacheKey, value: Bytes) -> BoxFuture<'_, Result<(), CacheError>> {
        self.insert(key.clone(), value);
        Box::pin(async { Ok(()) })
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&self, key: &CacheKey) -> BoxFuture<'_, Result<bool, CacheError>> {
        let removed = self.evict(key);
        Box::pin(async move { Ok(removed) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        self.entries.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        Box::pin(async { Ok(()) })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
