//! Pooled memory and admission control.
//!
//! - [`ByteArrayPool`]: bucketed, bounded free lists of reusable byte arrays
//! - [`BitmapCounter`]: gate on the aggregate size and count of decoded bitmaps
//! - [`MemoryTrimmableRegistry`]: fan-out of memory-pressure trims

mod bitmap_counter;
mod bucket;
mod params;
mod pool;
mod trim;

pub use bitmap_counter::{
    AdmissionError, BitmapCounter, CounterError, DEFAULT_MAX_BITMAP_COUNT,
    DEFAULT_MAX_BITMAP_SIZE,
};
pub use params::{
    PoolParams, PoolParamsError, DEFAULT_HARD_CAP, DEFAULT_MAX_BUCKET_SIZE,
    DEFAULT_MIN_BUCKET_SIZE,
};
pub use pool::{BucketStats, ByteArrayPool, PoolError, PoolStats};
pub use trim::{MemoryTrimmable, MemoryTrimmableRegistry, TrimLevel};

pub(crate) use pool::report_release_violation;
