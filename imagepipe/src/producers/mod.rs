//! Producer/consumer chain.
//!
//! A request flows through a linear chain of [`Producer`]s, each wrapping
//! the next and consuming its results. Every stage delivers exactly one
//! terminal callback per request: a final result, a failure, or a
//! cancellation. Cancellation is cooperative and observed at the next
//! continuation boundary.
//!
//! ```text
//! DecodeProducer -> DiskCacheReadProducer -> DiskCacheWriteProducer -> LocalFetchProducer
//! ```

mod consumers;
mod context;
mod contract;
mod decode;
mod disk_cache_read;
mod disk_cache_write;
mod error;
mod listener;
mod local_fetch;
mod request;

pub use consumers::{BaseConsumer, ChannelConsumer, CloneableResult, RequestOutcome};
pub use context::{ProducerContext, RequestId};
pub use contract::{BoxConsumer, Consumer, Producer, Status};
pub use decode::{DecodeProducer, DECODE_PRODUCER_NAME, EXTRA_BITMAP_SIZE, EXTRA_IMAGE_FORMAT};
pub use disk_cache_read::{
    DiskCacheReadProducer, DISK_CACHE_PRODUCER_NAME, EVENT_FIRST_TIER_READ_FAILED,
    EXTRA_CACHED_VALUE_FOUND,
};
pub use disk_cache_write::{DiskCacheWriteProducer, DISK_CACHE_WRITE_PRODUCER_NAME};
pub use error::{FetchError, PipelineError};
pub use listener::{ExtraMap, NoOpListener, ProducerListener, TracingListener};
pub use local_fetch::{
    decode_data_uri, file_path, DataFetchProducer, LocalFetchProducer, LocalFileFetchProducer,
    DATA_FETCH_PRODUCER_NAME, LOCAL_FETCH_PRODUCER_NAME, LOCAL_FILE_FETCH_PRODUCER_NAME,
};
pub use request::{CacheChoice, ImageRequest, ImageRequestBuilder, RequestLevel};
