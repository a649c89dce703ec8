//! One cache tier: a blob store fronted by a staging area.

use crate::cache::stats::{TierStats, TierStatsSnapshot};
use crate::cache::types::CacheError;
use crate::cache::{BlobStore, CacheKey, StagingArea};
use crate::encoded::{EncodedImage, PooledByteBufferFactory};
use crate::references::HandleError;
use crate::task::{Task, TaskOutcome};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle as RuntimeHandle;
use tracing::{debug, warn};

/// A disk cache tier.
///
/// Reads check in-flight writes first, then the blob store. Store I/O runs on
/// the tokio runtime given at construction; results come back as [`Task`]s.
#[derive(Clone)]
pub struct BufferedDiskCache {
    name: Arc<str>,
    store: Arc<dyn BlobStore>,
    staging: Arc<StagingArea>,
    buffers: PooledByteBufferFactory,
    runtime: RuntimeHandle,
    stats: Arc<TierStats>,
}

impl BufferedDiskCache {
    /// Creates a tier.
    ///
    /// # Arguments
    ///
    /// * `name` - Tier name used in logs ("small", "default")
    /// * `store` - Backing blob store
    /// * `buffers` - Factory for the pooled buffers hits are read into
    /// * `runtime` - Runtime that performs store I/O
    pub fn new(
        name: impl AsRef<str>,
        store: Arc<dyn BlobStore>,
        buffers: PooledByteBufferFactory,
        runtime: RuntimeHandle,
    ) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            store,
            staging: Arc::new(StagingArea::new()),
            buffers,
            runtime,
            stats: Arc::new(TierStats::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> TierStatsSnapshot {
        self.stats.snapshot()
    }

    /// Writes whose images are still held in the staging area.
    pub fn pending_writes(&self) -> usize {
        self.staging.len()
    }

    /// Synchronous membership check; never touches the value itself.
    pub fn contains_sync(&self, key: &CacheKey) -> bool {
        self.staging.contains(key) || self.store.contains(key)
    }

    /// Looks `key` up.
    ///
    /// The task resolves to `Some` on a hit, `None` on a miss, faulted on a
    /// store error, and cancelled if `is_cancelled` is set when the store read
    /// is about to start.
    pub fn get(&self, key: &CacheKey, is_cancelled: Arc<AtomicBool>) -> Task<Option<EncodedImage>> {
        if let Some(image) = self.staging.get(key) {
            self.stats.record_staging_hit();
            debug!(tier = %self.name, key = %key, "Found image in staging area");
            return Task::succeeded(Some(image));
        }

        let name = Arc::clone(&self.name);
        let store = Arc::clone(&self.store);
        let buffers = self.buffers.clone();
        let stats = Arc::clone(&self.stats);
        let key = key.clone();
        Task::spawn(&self.runtime, async move {
            if is_cancelled.load(Ordering::SeqCst) {
                return TaskOutcome::Cancelled;
            }
            match store.get(&key).await {
                Ok(Some(bytes)) => match read_into_buffer(&buffers, &bytes) {
                    Ok(image) => {
                        stats.record_hit();
                        debug!(tier = %name, key = %key, size = image.size(), "Disk cache hit");
                        TaskOutcome::Succeeded(Some(image))
                    }
                    Err(e) => {
                        stats.record_read_failure();
                        warn!(tier = %name, key = %key, error = %e, "Failed to buffer cached image");
                        TaskOutcome::fault(e)
                    }
                },
                Ok(None) => {
                    stats.record_miss();
                    debug!(tier = %name, key = %key, "Disk cache miss");
                    TaskOutcome::Succeeded(None)
                }
                Err(e) => {
                    stats.record_read_failure();
                    warn!(tier = %name, key = %key, error = %e, "Disk cache read failed");
                    TaskOutcome::fault(e)
                }
            }
        })
    }

    /// Writes `image` under `key` in the background.
    ///
    /// The image is readable from the staging area until the write finishes.
    /// The returned task resolves when the write has landed (or failed);
    /// callers are free to drop it.
    pub fn put(&self, key: &CacheKey, image: &EncodedImage) -> Task<()> {
        let (staged, writing) = match two_references(image) {
            Ok(pair) => pair,
            Err(e) => return Task::faulted(Arc::new(CacheError::from(e))),
        };
        self.staging.put(key.clone(), staged);

        let name = Arc::clone(&self.name);
        let store = Arc::clone(&self.store);
        let staging = Arc::clone(&self.staging);
        let stats = Arc::clone(&self.stats);
        let key = key.clone();
        Task::spawn(&self.runtime, async move {
            let mut writing = writing;
            let result = match writing.bytes() {
                Ok(bytes) => store.put(&key, Bytes::copy_from_slice(bytes)).await,
                Err(e) => Err(CacheError::from(e)),
            };
            staging.remove_if_same(&key, &writing);
            let _ = writing.close();

            match result {
                Ok(()) => {
                    stats.record_write();
                    debug!(tier = %name, key = %key, "Disk cache write complete");
                    TaskOutcome::Succeeded(())
                }
                Err(e) => {
                    stats.record_write_failure();
                    warn!(tier = %name, key = %key, error = %e, "Disk cache write failed");
                    TaskOutcome::fault(e)
                }
            }
        })
    }

    /// Removes `key` from the staging area and the store.
    pub async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let staged = self.staging.remove(key);
        let stored = self.store.remove(key).await?;
        Ok(staged || stored)
    }

    /// Removes everything from the staging area and the store.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.staging.clear_all();
        self.store.clear().await
    }
}

fn two_references(image: &EncodedImage) -> Result<(EncodedImage, EncodedImage), HandleError> {
    Ok((image.try_clone()?, image.try_clone()?))
}

fn read_into_buffer(
    buffers: &PooledByteBufferFactory,
    bytes: &[u8],
) -> Result<EncodedImage, CacheError> {
    let buffer = buffers.new_byte_buffer(bytes)?;
    Ok(EncodedImage::new(buffer)?)
}

impl std::fmt::Debug for BufferedDiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedDiskCache")
            .field("name", &self.name)
            .field("store", &self.store.name())
            .field("staged", &self.staging.len())
            .finish()
    }
}
