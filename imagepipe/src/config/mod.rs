//! Configuration for the image pipeline.
//!
//! Settings are read from an INI file (`~/.imagepipe/config.ini` by
//! default), starting from built-in defaults and overlaying whatever the
//! file provides.
//!
//! # Example
//!
//! ```
//! use imagepipe::config::{parse_size, ConfigFile};
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.bitmaps.max_count, 384);
//! assert_eq!(config.pool.hard_cap, parse_size("64MB").unwrap());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{BitmapSettings, CacheSettings, ConfigFile, LoggingSettings, PoolSettings};
pub use size::{format_size, parse_size, Size, SizeParseError};
