//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`cache`] - Disk cache management (clear)
//! - [`config`] - Configuration management (show, path, init)
//! - [`fetch`] - Run one request through the pipeline

pub mod cache;
pub mod common;
pub mod config;
pub mod fetch;
