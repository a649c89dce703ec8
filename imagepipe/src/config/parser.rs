//! INI parsing: `Ini` to `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;

use super::defaults::default_small_cache_directory;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

const SIZE_HINT: &str = "expected format like '4MB', '128KB', or '16384'";

/// Parses `ini` into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [pool] section
    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = size_value(section, "pool", "min_bucket_size")? {
            config.pool.min_bucket_size = v;
        }
        if let Some(v) = size_value(section, "pool", "max_bucket_size")? {
            config.pool.max_bucket_size = v;
        }
        if let Some(v) = section.get("max_free_per_bucket") {
            config.pool.max_free_per_bucket = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(invalid(
                        "pool",
                        "max_free_per_bucket",
                        v,
                        "must be a positive integer",
                    ))
                }
            };
        }
        if let Some(v) = size_value(section, "pool", "hard_cap")? {
            config.pool.hard_cap = v;
        }
        if let Err(e) = config.pool.to_params() {
            return Err(invalid(
                "pool",
                "min_bucket_size",
                &config.pool.min_bucket_size.to_string(),
                &e.to_string(),
            ));
        }
    }

    // [bitmaps] section
    if let Some(section) = ini.section(Some("bitmaps")) {
        if let Some(v) = section.get("max_count") {
            config.bitmaps.max_count = v
                .trim()
                .parse()
                .map_err(|_| invalid("bitmaps", "max_count", v, "must be an integer"))?;
        }
        if let Some(v) = size_value(section, "bitmaps", "max_size")? {
            config.bitmaps.max_size = v;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        let mut small_set = false;
        if let Some(v) = section.get("small_directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.small_directory = expand_tilde(v);
                small_set = true;
            }
        }
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.cache.directory = expand_tilde(v);
                if !small_set {
                    config.cache.small_directory =
                        default_small_cache_directory(&config.cache.directory);
                }
            }
        }
        if let Some(v) = size_value(section, "cache", "force_small_threshold")? {
            config.cache.force_small_threshold = v;
        }
        if let Some(v) = section.get("disk_cache_enabled") {
            config.cache.disk_cache_enabled = parse_bool(v).ok_or_else(|| {
                invalid("cache", "disk_cache_enabled", v, "must be true or false")
            })?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if v.is_empty() || v.contains(['/', '\\']) {
                return Err(invalid("logging", "file", v, "must be a plain file name"));
            }
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn size_value(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<usize>, ConfigFileError> {
    section
        .get(key)
        .map(|v| parse_size(v).map_err(|_| invalid(name, key, v, SIZE_HINT)))
        .transpose()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
