use super::BufferedDiskCache;
use crate::producers::CacheChoice;

/// The small and default disk cache tiers.
#[derive(Debug, Clone)]
pub struct CacheTiers {
    pub default: BufferedDiskCache,
    pub small: BufferedDiskCache,
}

impl CacheTiers {
    pub fn new(default: BufferedDiskCache, small: BufferedDiskCache) -> Self {
        Self { default, small }
    }

    pub fn for_choice(&self, choice: CacheChoice) -> &BufferedDiskCache {
        match choice {
            CacheChoice::Small => &self.small,
            CacheChoice::Default => &self.default,
        }
    }
}
