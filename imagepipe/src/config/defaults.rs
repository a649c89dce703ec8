//! Default values for every configuration key.

use crate::memory::{
    DEFAULT_HARD_CAP, DEFAULT_MAX_BITMAP_COUNT, DEFAULT_MAX_BITMAP_SIZE, DEFAULT_MAX_BUCKET_SIZE,
    DEFAULT_MIN_BUCKET_SIZE,
};
use std::path::PathBuf;

/// Name of the per-user configuration directory under `$HOME`.
pub const CONFIG_DIR_NAME: &str = ".imagepipe";

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

pub const DEFAULT_POOL_MIN_BUCKET_SIZE: usize = DEFAULT_MIN_BUCKET_SIZE;
pub const DEFAULT_POOL_MAX_BUCKET_SIZE: usize = DEFAULT_MAX_BUCKET_SIZE;
pub const DEFAULT_POOL_HARD_CAP: usize = DEFAULT_HARD_CAP;

pub const DEFAULT_BITMAP_MAX_COUNT: usize = DEFAULT_MAX_BITMAP_COUNT;
pub const DEFAULT_BITMAP_MAX_SIZE: usize = DEFAULT_MAX_BITMAP_SIZE;

/// Tiered lookup is off unless a threshold is configured.
pub const DEFAULT_FORCE_SMALL_THRESHOLD: usize = 0;

pub const DEFAULT_DISK_CACHE_ENABLED: bool = true;

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "imagepipe.log";

/// Number of CPUs available to this process.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Default free-list length per pool bucket: one buffer per CPU.
pub fn default_max_free_per_bucket() -> usize {
    num_cpus()
}

/// Default cache root: the platform cache directory, or `./cache`.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("imagepipe"))
        .unwrap_or_else(|| PathBuf::from("cache"))
}

/// Default small tier directory inside `cache_directory`.
pub fn default_small_cache_directory(cache_directory: &std::path::Path) -> PathBuf {
    cache_directory.join("small")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_cpus_is_positive() {
        assert!(num_cpus() >= 1);
        assert_eq!(default_max_free_per_bucket(), num_cpus());
    }

    #[test]
    fn test_small_directory_nests_under_cache() {
        let root = PathBuf::from("/var/cache/imagepipe");
        assert_eq!(
            default_small_cache_directory(&root),
            PathBuf::from("/var/cache/imagepipe/small")
        );
    }
}
