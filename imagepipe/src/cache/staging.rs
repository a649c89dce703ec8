//! Images whose disk writes are still in flight.

use crate::cache::CacheKey;
use crate::encoded::EncodedImage;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

/// Holds one reference to each image queued for a disk write, so reads
/// issued before the write lands still hit.
#[derive(Debug, Default)]
pub struct StagingArea {
    entries: Mutex<HashMap<CacheKey, EncodedImage>>,
}

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `image` under `key`, taking over its reference.
    pub fn put(&self, key: CacheKey, image: EncodedImage) {
        let previous = self.entries.lock().insert(key, image);
        // Close outside the lock.
        drop(previous);
    }

    /// Returns a new reference to the staged image, if any.
    pub fn get(&self, key: &CacheKey) -> Option<EncodedImage> {
        let mut entries = self.entries.lock();
        let cloned = entries.get(key).map(EncodedImage::try_clone)?;
        match cloned {
            Ok(image) => Some(image),
            Err(_) => {
                trace!(key = %key, "Dropping released staged image");
                let stale = entries.remove(key);
                drop(entries);
                drop(stale);
                None
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Unstages `key` only if it still holds the same bytes as `image`.
    pub fn remove_if_same(&self, key: &CacheKey, image: &EncodedImage) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let same = entries
                .get(key)
                .is_some_and(|staged| staged.shares_buffer_with(image));
            if same {
                entries.remove(key)
            } else {
                None
            }
        };
        removed.is_some()
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.entries.lock().remove(key);
        removed.is_some()
    }

    pub fn clear_all(&self) {
        let drained: Vec<EncodedImage> = self.entries.lock().drain().map(|(_, v)| v).collect();
        drop(drained);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
