//! Settings structs, one per INI section.

use super::defaults::*;
use crate::memory::{BitmapCounter, PoolParams, PoolParamsError};
use std::path::PathBuf;

/// Complete configuration loaded from `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub pool: PoolSettings,
    pub bitmaps: BitmapSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

/// `[pool]`: byte-array pool layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Smallest bucket size in bytes
    pub min_bucket_size: usize,
    /// Largest bucket size in bytes; buckets double in between
    pub max_bucket_size: usize,
    /// Free buffers retained per bucket
    pub max_free_per_bucket: usize,
    /// Upper bound on bytes checked out of the pool
    pub hard_cap: usize,
}

impl PoolSettings {
    /// Pool layout described by these settings.
    pub fn to_params(&self) -> Result<PoolParams, PoolParamsError> {
        PoolParams::powers_of_two(
            self.min_bucket_size,
            self.max_bucket_size,
            self.max_free_per_bucket,
            self.hard_cap,
        )
    }
}

/// `[bitmaps]`: bitmap admission limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapSettings {
    pub max_count: usize,
    /// Total pixel bytes
    pub max_size: usize,
}

impl BitmapSettings {
    pub fn to_counter(&self) -> BitmapCounter {
        BitmapCounter::new(self.max_count, self.max_size)
    }
}

/// `[cache]`: disk cache tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Default tier directory
    pub directory: PathBuf,
    /// Small tier directory
    pub small_directory: PathBuf,
    /// Non-zero enables tiered lookup across both tiers
    pub force_small_threshold: usize,
    pub disk_cache_enabled: bool,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let directory = default_cache_directory();
        Self {
            pool: PoolSettings {
                min_bucket_size: DEFAULT_POOL_MIN_BUCKET_SIZE,
                max_bucket_size: DEFAULT_POOL_MAX_BUCKET_SIZE,
                max_free_per_bucket: default_max_free_per_bucket(),
                hard_cap: DEFAULT_POOL_HARD_CAP,
            },
            bitmaps: BitmapSettings {
                max_count: DEFAULT_BITMAP_MAX_COUNT,
                max_size: DEFAULT_BITMAP_MAX_SIZE,
            },
            cache: CacheSettings {
                small_directory: default_small_cache_directory(&directory),
                directory,
                force_small_threshold: DEFAULT_FORCE_SMALL_THRESHOLD,
                disk_cache_enabled: DEFAULT_DISK_CACHE_ENABLED,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_settings_build_valid_params() {
        let params = ConfigFile::default().pool.to_params().unwrap();
        assert_eq!(params.bucket_sizes().first(), Some(&DEFAULT_POOL_MIN_BUCKET_SIZE));
        assert_eq!(params.max_bucket_size(), DEFAULT_POOL_MAX_BUCKET_SIZE);
        assert_eq!(params.hard_cap(), DEFAULT_POOL_HARD_CAP);
    }

    #[test]
    fn test_bitmap_settings_build_counter() {
        let counter = ConfigFile::default().bitmaps.to_counter();
        assert_eq!(counter.max_count(), 384);
        assert_eq!(counter.max_size(), 256 * 1024 * 1024);
    }
}
