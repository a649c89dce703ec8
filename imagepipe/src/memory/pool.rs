//! Bucketed pool of reusable byte arrays.
//!
//! Buffers are grouped by canonical size. Each bucket keeps a bounded free
//! list; released buffers beyond the bound are dropped. Memory pressure
//! ([`TrimLevel`]) shrinks the free lists, and a buffer that was trimmed away
//! is simply replaced by a fresh allocation on the next request.
//!
//! # Locking
//!
//! Every bucket has its own short critical section. Allocation and
//! deallocation always happen outside it.

use super::bucket::{Bucket, Returned};
use super::params::PoolParams;
use super::trim::{MemoryTrimmable, MemoryTrimmableRegistry, TrimLevel};
use crate::references::Handle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{error, info};

/// Errors from acquiring or releasing pooled buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The request is larger than the largest bucket.
    #[error("no bucket can hold {requested} bytes (largest bucket is {max_bucket_size})")]
    NoBucket {
        requested: usize,
        max_bucket_size: usize,
    },

    /// Serving the request would exceed the pool's hard cap.
    #[error("buffer pool hard cap exceeded: {in_use} bytes in use + {requested} requested > {hard_cap}")]
    HardCapExceeded {
        requested: usize,
        in_use: usize,
        hard_cap: usize,
    },

    /// A released buffer's length matches no bucket.
    #[error("released buffer of {len} bytes does not belong to any bucket")]
    UnknownBucket { len: usize },

    /// More buffers were released to a bucket than were acquired from it.
    #[error("buffer released to the {bucket_size}-byte bucket with no outstanding acquisition")]
    ReleaseWithoutAcquire { bucket_size: usize },
}

/// Per-bucket counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    pub bucket_size: usize,
    pub in_use: usize,
    pub free: usize,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub allocations: u64,
    pub reuses: u64,
    pub buckets: Vec<BucketStats>,
}

impl PoolStats {
    /// Buffers currently handed out.
    pub fn in_use_count(&self) -> usize {
        self.buckets.iter().map(|b| b.in_use).sum()
    }

    /// Buffers waiting on free lists.
    pub fn free_count(&self) -> usize {
        self.buckets.iter().map(|b| b.free).sum()
    }
}

/// Thread-safe bucketed byte-array pool.
///
/// # Example
///
/// ```
/// use imagepipe::memory::{ByteArrayPool, PoolParams};
///
/// let pool = ByteArrayPool::new(PoolParams::new(vec![1024, 4096], 2, 1 << 20).unwrap());
/// let mut buffer = pool.acquire(1500).unwrap();
/// assert_eq!(buffer.get().unwrap().len(), 4096);
/// buffer.close().unwrap();
/// assert_eq!(pool.stats().free_count(), 1);
/// ```
pub struct ByteArrayPool {
    params: PoolParams,
    buckets: Vec<Mutex<Bucket>>,
    used_bytes: AtomicUsize,
    allocations: AtomicU64,
    reuses: AtomicU64,
    weak_self: Weak<ByteArrayPool>,
}

impl ByteArrayPool {
    /// Creates a pool with the given bucket layout.
    pub fn new(params: PoolParams) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| {
            let buckets = params
                .bucket_sizes()
                .iter()
                .map(|&size| Mutex::new(Bucket::new(size, params.max_free_per_bucket())))
                .collect();
            Self {
                params,
                buckets,
                used_bytes: AtomicUsize::new(0),
                allocations: AtomicU64::new(0),
                reuses: AtomicU64::new(0),
                weak_self: weak_self.clone(),
            }
        })
    }

    /// Creates a pool and registers it for memory-pressure trims.
    pub fn with_registry(params: PoolParams, registry: &MemoryTrimmableRegistry) -> Arc<Self> {
        let pool = Self::new(params);
        let trimmable: Arc<dyn MemoryTrimmable> = pool.clone();
        registry.register(Arc::downgrade(&trimmable));
        pool
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    /// Acquires a buffer of at least `size` bytes as a handle whose
    /// releaser returns it to this pool.
    pub fn acquire(&self, size: usize) -> Result<Handle<Vec<u8>>, PoolError> {
        let buffer = self.get(size)?;
        Ok(Handle::of(buffer, self.releaser()))
    }

    /// Acquires a raw buffer of the owning bucket's canonical size.
    ///
    /// The caller must hand the buffer back through [`ByteArrayPool::release`]
    /// with its length unchanged.
    pub fn get(&self, size: usize) -> Result<Vec<u8>, PoolError> {
        let index =
            self.params
                .bucket_index_for_request(size)
                .ok_or(PoolError::NoBucket {
                    requested: size,
                    max_bucket_size: self.params.max_bucket_size(),
                })?;
        let bucket_size = self.params.bucket_sizes()[index];
        self.reserve(bucket_size)?;

        let pooled = self.buckets[index].lock().checkout();
        match pooled {
            Some(buffer) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                Ok(buffer)
            }
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                Ok(vec![0u8; bucket_size])
            }
        }
    }

    /// Returns a buffer to its bucket.
    pub fn release(&self, buffer: Vec<u8>) -> Result<(), PoolError> {
        let len = buffer.len();
        let index = self
            .params
            .bucket_index_for_buffer(len)
            .ok_or(PoolError::UnknownBucket { len })?;

        let returned = self.buckets[index].lock().give_back(buffer);
        match returned {
            None => Err(PoolError::ReleaseWithoutAcquire { bucket_size: len }),
            Some(outcome) => {
                self.used_bytes.fetch_sub(len, Ordering::SeqCst);
                if let Returned::Overflow(buffer) = outcome {
                    drop(buffer);
                }
                Ok(())
            }
        }
    }

    /// Releaser routing buffers back to this pool.
    ///
    /// If the pool is gone by the time the buffer is released, the buffer is
    /// dropped.
    pub fn releaser(&self) -> impl FnOnce(Vec<u8>) + Send + Sync + 'static {
        let pool = self.weak_self.clone();
        move |buffer| {
            if let Some(pool) = pool.upgrade() {
                if let Err(e) = pool.release(buffer) {
                    report_release_violation(&e);
                }
            }
        }
    }

    /// Bytes currently handed out.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let buckets: Vec<BucketStats> = self
            .buckets
            .iter()
            .map(|bucket| {
                let bucket = bucket.lock();
                BucketStats {
                    bucket_size: bucket.item_size(),
                    in_use: bucket.in_use(),
                    free: bucket.free_len(),
                }
            })
            .collect();
        PoolStats {
            used_bytes: self.used_bytes(),
            free_bytes: buckets.iter().map(|b| b.bucket_size * b.free).sum(),
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            buckets,
        }
    }

    fn reserve(&self, bytes: usize) -> Result<(), PoolError> {
        let hard_cap = self.params.hard_cap();
        self.used_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(bytes).filter(|&total| total <= hard_cap)
            })
            .map(|_| ())
            .map_err(|in_use| PoolError::HardCapExceeded {
                requested: bytes,
                in_use,
                hard_cap,
            })
    }
}

impl MemoryTrimmable for ByteArrayPool {
    fn trim(&self, level: TrimLevel) {
        let mut freed_buffers = 0usize;
        let mut freed_bytes = 0usize;
        for bucket in &self.buckets {
            let removed = {
                let mut bucket = bucket.lock();
                let keep = level.retained(bucket.free_len());
                bucket.trim_to(keep)
            };
            freed_buffers += removed.len();
            freed_bytes += removed.iter().map(Vec::len).sum::<usize>();
        }
        info!(?level, freed_buffers, freed_bytes, "Byte array pool trimmed");
    }
}

impl std::fmt::Debug for ByteArrayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteArrayPool")
            .field("params", &self.params)
            .field("used_bytes", &self.used_bytes())
            .finish()
    }
}

/// Lifetime violations inside a releaser cannot be returned to anyone.
pub(crate) fn report_release_violation(error: &dyn std::error::Error) {
    error!(error = %error, "Resource lifetime violation during release");
    debug_assert!(false, "resource lifetime violation during release: {error}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool(max_free: usize) -> Arc<ByteArrayPool> {
        ByteArrayPool::new(PoolParams::new(vec![16, 32, 64], max_free, 1024).unwrap())
    }

    #[test]
    fn test_acquire_rounds_up_to_bucket() {
        let pool = small_pool(2);
        let handle = pool.acquire(17).unwrap();
        assert_eq!(handle.get().unwrap().len(), 32);
        assert_eq!(pool.used_bytes(), 32);
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let pool = small_pool(2);
        let mut first = pool.acquire(10).unwrap();
        first.close().unwrap();

        let _second = pool.acquire(12).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
    }

    #[test]
    fn test_free_list_is_capped() {
        let pool = small_pool(1);
        let a = pool.acquire(16).unwrap();
        let b = pool.acquire(16).unwrap();
        drop(a);
        drop(b);

        let stats = pool.stats();
        assert_eq!(stats.free_count(), 1);
        assert_eq!(stats.in_use_count(), 0);
        assert_eq!(stats.used_bytes, 0);
    }

    #[test]
    fn test_request_larger_than_largest_bucket() {
        let pool = small_pool(1);
        assert_eq!(
            pool.acquire(65).unwrap_err(),
            PoolError::NoBucket {
                requested: 65,
                max_bucket_size: 64
            }
        );
    }

    #[test]
    fn test_hard_cap_rejects_without_side_effects() {
        let pool = ByteArrayPool::new(PoolParams::new(vec![64], 4, 100).unwrap());
        let _held = pool.acquire(64).unwrap();

        let err = pool.acquire(64).unwrap_err();
        assert!(matches!(err, PoolError::HardCapExceeded { in_use: 64, .. }));
        assert_eq!(pool.used_bytes(), 64);
        assert_eq!(pool.stats().in_use_count(), 1);
    }

    #[test]
    fn test_release_of_foreign_size_is_an_error() {
        let pool = small_pool(1);
        assert_eq!(
            pool.release(vec![0; 20]),
            Err(PoolError::UnknownBucket { len: 20 })
        );
    }

    #[test]
    fn test_release_without_acquire_is_an_error() {
        let pool = small_pool(1);
        assert_eq!(
            pool.release(vec![0; 16]),
            Err(PoolError::ReleaseWithoutAcquire { bucket_size: 16 })
        );
    }

    #[test]
    fn test_live_handles_never_alias() {
        let pool = small_pool(4);
        let handles: Vec<_> = (0..4).map(|_| pool.acquire(16).unwrap()).collect();
        let ptrs: std::collections::HashSet<_> = handles
            .iter()
            .map(|h| h.get().unwrap().as_ptr() as usize)
            .collect();
        assert_eq!(ptrs.len(), 4);
    }

    #[test]
    fn test_trim_critical_empties_free_lists() {
        let pool = small_pool(4);
        let handles: Vec<_> = (0..4).map(|_| pool.acquire(16).unwrap()).collect();
        drop(handles);
        assert_eq!(pool.stats().free_count(), 4);

        pool.trim(TrimLevel::Moderate);
        assert_eq!(pool.stats().free_count(), 2);

        pool.trim(TrimLevel::Critical);
        assert_eq!(pool.stats().free_count(), 0);

        // A trimmed slot is transparently replaced by a fresh allocation.
        let handle = pool.acquire(16).unwrap();
        assert_eq!(handle.get().unwrap().len(), 16);
        assert_eq!(pool.stats().allocations, 5);
    }

    #[test]
    fn test_registry_trims_pool() {
        let registry = MemoryTrimmableRegistry::new();
        let pool = ByteArrayPool::with_registry(
            PoolParams::new(vec![16], 2, 1024).unwrap(),
            &registry,
        );
        drop(pool.acquire(16).unwrap());
        assert_eq!(pool.stats().free_count(), 1);

        assert_eq!(registry.trim(TrimLevel::Critical), 1);
        assert_eq!(pool.stats().free_count(), 0);
    }

    #[test]
    fn test_handle_outliving_pool_is_dropped() {
        let pool = small_pool(1);
        let handle = pool.acquire(16).unwrap();
        drop(pool);
        drop(handle);
    }
}
