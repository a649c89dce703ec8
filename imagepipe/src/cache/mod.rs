//! Two-tier disk cache for encoded images.
//!
//! Each tier is a [`BufferedDiskCache`]: a [`BlobStore`] fronted by a
//! [`StagingArea`] of in-flight writes. The stores are opaque; this crate
//! ships an in-memory one and a file-per-key one.

mod buffered;
mod disk;
mod key;
mod memory;
mod staging;
mod stats;
mod store;
mod tiers;
mod types;

pub use buffered::BufferedDiskCache;
pub use disk::DiskBlobStore;
pub use key::{CacheKey, CacheKeyFactory, DefaultCacheKeyFactory};
pub use memory::MemoryBlobStore;
pub use staging::StagingArea;
pub use stats::{TierStats, TierStatsSnapshot};
pub use store::BlobStore;
pub use tiers::CacheTiers;
pub use types::CacheError;
