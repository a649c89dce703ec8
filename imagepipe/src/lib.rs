//! imagepipe - a producer/consumer image pipeline
//!
//! Requests flow through a linear chain of stages: decode, disk cache read,
//! disk cache write, local fetch. Encoded bytes live in pooled,
//! reference-counted buffers; decoded bitmaps are admitted against a global
//! count and size budget.
//!
//! # High-Level API
//!
//! ```no_run
//! use imagepipe::pipeline::ImagePipeline;
//! use imagepipe::producers::{ImageRequest, RequestOutcome};
//!
//! # async fn run() {
//! let pipeline = ImagePipeline::builder(tokio::runtime::Handle::current()).build();
//! let handle = pipeline.fetch_decoded(ImageRequest::new("file:///tmp/cat.png"));
//! match handle.outcome().await {
//!     RequestOutcome::Completed(Some(image)) => {
//!         let image = image.get().unwrap();
//!         println!("{}x{}", image.width(), image.height());
//!     }
//!     other => println!("{:?}", other.is_completed()),
//! }
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod decoder;
pub mod encoded;
pub mod executor;
pub mod logging;
pub mod memory;
pub mod pipeline;
pub mod producers;
pub mod references;
pub mod task;

/// Version of the imagepipe library and CLI.
///
/// Synchronized across the workspace via `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
