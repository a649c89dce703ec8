//! INI serialization: `ConfigFile` to the commented text written to disk.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[pool]
; Byte-array pool: buckets double from min_bucket_size to max_bucket_size.
min_bucket_size = {}
max_bucket_size = {}
; Free buffers retained per bucket (default: number of CPUs)
max_free_per_bucket = {}
; Upper bound on bytes checked out of the pool at once
hard_cap = {}

[bitmaps]
; Decoded bitmaps admitted at once, by count and by total pixel bytes
max_count = {}
max_size = {}

[cache]
; Default and small disk cache tiers
directory = {}
small_directory = {}
; 0 routes by cache choice; otherwise images below this size go to the small tier
; and lookups consult both tiers
force_small_threshold = {}
disk_cache_enabled = {}

[logging]
directory = {}
file = {}
"#,
        format_size(config.pool.min_bucket_size),
        format_size(config.pool.max_bucket_size),
        config.pool.max_free_per_bucket,
        format_size(config.pool.hard_cap),
        config.bitmaps.max_count,
        format_size(config.bitmaps.max_size),
        path_to_string(&config.cache.directory),
        path_to_string(&config.cache.small_directory),
        format_size(config.cache.force_small_threshold),
        config.cache.disk_cache_enabled,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
