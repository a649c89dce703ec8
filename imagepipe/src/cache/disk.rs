//! On-disk blob store.

use crate::cache::types::CacheError;
use crate::cache::{BlobStore, CacheKey};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Blob store writing one file per key.
///
/// # Directory Structure
///
/// ```text
/// {root}/{resource_id[..2]}/{resource_id}.cnt
/// ```
///
/// Values are written to a temporary sibling file and renamed into place, so
/// readers never observe a partial value.
///
/// # Example
///
/// ```
/// use imagepipe::cache::{BlobStore, CacheKey, DiskBlobStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = DiskBlobStore::new("default", dir.path());
/// assert!(!store.contains(&CacheKey::new("file:///a.png")));
/// ```
#[derive(Debug)]
pub struct DiskBlobStore {
    name: String,
    root: PathBuf,
    /// Bytes written during this session.
    bytes_written: AtomicU64,
    temp_counter: AtomicU64,
}

impl DiskBlobStore {
    /// Creates a store rooted at `root`; directories are created on demand.
    ///
    /// # Arguments
    ///
    /// * `name` - Tier name used in logs
    /// * `root` - Directory holding the store's files
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            bytes_written: AtomicU64::new(0),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the bytes written during this session only, not the total
    /// disk usage of the store.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let id = key.resource_id();
        self.root.join(&id[..2]).join(format!("{}.cnt", id))
    }

    fn temp_path_for(&self, path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("cnt.tmp{}", n))
    }
}

impl BlobStore for DiskBlobStore {
    fn get(&self, key: &CacheKey) -> BoxFuture<'_, Result<Option<Bytes>, CacheError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(CacheError::Io(e)),
            }
        })
    }

    fn put(&self, key: &CacheKey, value: Bytes) -> BoxFuture<'_, Result<(), CacheError>> {
        let path = self.path_for(key);
        let temp_path = self.temp_path_for(&path);
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&temp_path, &value).await?;
            if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(CacheError::Io(e));
            }
            self.bytes_written
                .fetch_add(value.len() as u64, Ordering::Relaxed);
            debug!(store = %self.name, path = %path.display(), bytes = value.len(), "Blob written");
            Ok(())
        })
    }

    fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    fn remove(&self, key: &CacheKey) -> BoxFuture<'_, Result<bool, CacheError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(CacheError::Io(e)),
            }
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            match tokio::fs::remove_dir_all(&self.root).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CacheError::Io(e)),
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_disk_store_path_construction() {
        let store = DiskBlobStore::new("default", "/cache");
        let key = CacheKey::new("abc");
        assert_eq!(
            store.path_for(&key),
            PathBuf::from(
                "/cache/ba/ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.cnt"
            )
        );
    }

    #[tokio::test]
    async fn test_disk_store_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new("default", temp_dir.path());
        let key = CacheKey::new("file:///cat.jpg");

        store.put(&key, Bytes::from_static(b"meow")).await.unwrap();
        assert!(store.contains(&key));
        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(Bytes::from_static(b"meow"))
        );
        assert_eq!(store.bytes_written(), 4);
    }

    #[tokio::test]
    async fn test_disk_store_miss_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new("default", temp_dir.path());
        let key = CacheKey::new("missing");
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(!store.contains(&key));
        assert!(!store.remove(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_disk_store_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new("default", temp_dir.path());
        let key = CacheKey::new("k");
        store.put(&key, Bytes::from_static(b"v1")).await.unwrap();
        store.put(&key, Bytes::from_static(b"v2")).await.unwrap();

        let shard = store.path_for(&key).parent().unwrap().to_path_buf();
        let files: Vec<_> = std::fs::read_dir(shard).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(Bytes::from_static(b"v2"))
        );
    }

    #[tokio::test]
    async fn test_disk_store_remove_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new("default", temp_dir.path().join("store"));
        let a = CacheKey::new("a");
        let b = CacheKey::new("b");
        store.put(&a, Bytes::from_static(b"1")).await.unwrap();
        store.put(&b, Bytes::from_static(b"2")).await.unwrap();

        assert!(store.remove(&a).await.unwrap());
        assert!(!store.contains(&a));

        store.clear().await.unwrap();
        assert!(!store.contains(&b));
        store.clear().await.unwrap();
    }
}
