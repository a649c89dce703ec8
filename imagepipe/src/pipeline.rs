//! The assembled pipeline.
//!
//! [`ImagePipeline`] wires the stages into one chain per result type:
//!
//! ```text
//! fetch_decoded: Decode -> DiskCacheRead -> DiskCacheWrite -> LocalFetch
//! fetch_encoded:           DiskCacheRead -> DiskCacheWrite -> LocalFetch
//! ```
//!
//! Every fetch returns a [`RequestHandle`] that can cancel the request and
//! await its terminal outcome.

use crate::cache::{
    BlobStore, BufferedDiskCache, CacheError, CacheKeyFactory, CacheTiers,
    DefaultCacheKeyFactory, DiskBlobStore, MemoryBlobStore, TierStatsSnapshot,
};
use crate::config::ConfigFile;
use crate::decoder::{DecodedImage, Decoder, ImageCrateDecoder, PurgeableDecoder};
use crate::encoded::{EncodedImage, PooledByteBufferFactory};
use crate::executor::TokioExecutor;
use crate::memory::{
    BitmapCounter, ByteArrayPool, MemoryTrimmableRegistry, PoolParams, PoolParamsError,
    TrimLevel, DEFAULT_MAX_BITMAP_COUNT, DEFAULT_MAX_BITMAP_SIZE,
};
use crate::producers::{
    BaseConsumer, ChannelConsumer, CloneableResult, DecodeProducer, DiskCacheReadProducer,
    DiskCacheWriteProducer, ImageRequest, LocalFetchProducer, PipelineError, Producer,
    ProducerContext, ProducerListener, RequestId, RequestOutcome, TracingListener,
};
use crate::references::Handle;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Errors from assembling a pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid pool layout: {0}")]
    Pool(#[from] PoolParamsError),

    #[error("invalid cache setup: {0}")]
    Cache(#[from] CacheError),
}

/// Builder for [`ImagePipeline`].
pub struct ImagePipelineBuilder {
    runtime: RuntimeHandle,
    pool_params: PoolParams,
    max_bitmap_count: usize,
    max_bitmap_size: usize,
    default_store: Option<Arc<dyn BlobStore>>,
    small_store: Option<Arc<dyn BlobStore>>,
    force_small_cache_threshold: usize,
    disk_cache_enabled: bool,
    decoder: Arc<dyn Decoder>,
    listener: Arc<dyn ProducerListener>,
    key_factory: Arc<dyn CacheKeyFactory>,
}

impl ImagePipelineBuilder {
    /// Defaults: power-of-two pool, in-memory tiers, tracing listener.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Runtime for disk I/O and blocking fetch/decode work
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            pool_params: PoolParams::default(),
            max_bitmap_count: DEFAULT_MAX_BITMAP_COUNT,
            max_bitmap_size: DEFAULT_MAX_BITMAP_SIZE,
            default_store: None,
            small_store: None,
            force_small_cache_threshold: 0,
            disk_cache_enabled: true,
            decoder: Arc::new(ImageCrateDecoder::new()),
            listener: Arc::new(TracingListener),
            key_factory: Arc::new(DefaultCacheKeyFactory),
        }
    }

    /// Builder configured from a config file, with on-disk tiers.
    pub fn from_config(config: &ConfigFile, runtime: RuntimeHandle) -> Result<Self, BuildError> {
        if config.cache.directory == config.cache.small_directory {
            return Err(CacheError::InvalidConfig(format!(
                "small and default tiers share {}",
                config.cache.directory.display()
            ))
            .into());
        }
        Ok(Self::new(runtime)
            .pool_params(config.pool.to_params()?)
            .bitmap_limits(config.bitmaps.max_count, config.bitmaps.max_size)
            .default_store(Arc::new(DiskBlobStore::new(
                "default",
                config.cache.directory.clone(),
            )))
            .small_store(Arc::new(DiskBlobStore::new(
                "small",
                config.cache.small_directory.clone(),
            )))
            .force_small_cache_threshold(config.cache.force_small_threshold)
            .disk_cache_enabled(config.cache.disk_cache_enabled))
    }

    pub fn pool_params(mut self, params: PoolParams) -> Self {
        self.pool_params = params;
        self
    }

    pub fn bitmap_limits(mut self, max_count: usize, max_size: usize) -> Self {
        self.max_bitmap_count = max_count;
        self.max_bitmap_size = max_size;
        self
    }

    pub fn default_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.default_store = Some(store);
        self
    }

    pub fn small_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.small_store = Some(store);
        self
    }

    /// `0` disables tiered lookup.
    pub fn force_small_cache_threshold(mut self, threshold: usize) -> Self {
        self.force_small_cache_threshold = threshold;
        self
    }

    /// When `false`, every request skips the disk tiers.
    pub fn disk_cache_enabled(mut self, enabled: bool) -> Self {
        self.disk_cache_enabled = enabled;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ProducerListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn key_factory(mut self, key_factory: Arc<dyn CacheKeyFactory>) -> Self {
        self.key_factory = key_factory;
        self
    }

    pub fn build(self) -> ImagePipeline {
        let trim_registry = MemoryTrimmableRegistry::new();
        let pool = ByteArrayPool::with_registry(self.pool_params, &trim_registry);
        let buffers = PooledByteBufferFactory::new(Arc::clone(&pool));
        let counter = Arc::new(BitmapCounter::new(
            self.max_bitmap_count,
            self.max_bitmap_size,
        ));
        let executor = Arc::new(TokioExecutor::new(self.runtime.clone()));

        let default_store = self
            .default_store
            .unwrap_or_else(|| Arc::new(MemoryBlobStore::new("default")));
        let small_store = self
            .small_store
            .unwrap_or_else(|| Arc::new(MemoryBlobStore::new("small")));
        let tiers = CacheTiers::new(
            BufferedDiskCache::new("default", default_store, buffers.clone(), self.runtime.clone()),
            BufferedDiskCache::new("small", small_store, buffers.clone(), self.runtime.clone()),
        );

        let fetch: Arc<dyn Producer<EncodedImage>> =
            Arc::new(LocalFetchProducer::new(Arc::clone(&executor), buffers));
        let write: Arc<dyn Producer<EncodedImage>> = Arc::new(DiskCacheWriteProducer::new(
            tiers.clone(),
            Arc::clone(&self.key_factory),
            fetch,
            self.force_small_cache_threshold,
        ));
        let encoded: Arc<dyn Producer<EncodedImage>> = Arc::new(DiskCacheReadProducer::new(
            tiers.clone(),
            Arc::clone(&self.key_factory),
            write,
            self.force_small_cache_threshold,
        ));
        let decoder = Arc::new(PurgeableDecoder::new(
            self.decoder,
            Arc::clone(&pool),
            Arc::clone(&counter),
        ));
        let decoded: Arc<dyn Producer<Handle<DecodedImage>>> = Arc::new(DecodeProducer::new(
            decoder,
            executor,
            Arc::clone(&encoded),
        ));

        info!(
            buckets = pool.params().bucket_sizes().len(),
            max_bucket_size = pool.params().max_bucket_size(),
            hard_cap = pool.params().hard_cap(),
            max_bitmap_count = counter.max_count(),
            max_bitmap_size = counter.max_size(),
            tiered = self.force_small_cache_threshold > 0,
            disk_cache_enabled = self.disk_cache_enabled,
            "Image pipeline built"
        );

        ImagePipeline {
            encoded,
            decoded,
            tiers,
            pool,
            counter,
            trim_registry,
            listener: self.listener,
            disk_cache_enabled: self.disk_cache_enabled,
        }
    }
}

/// Entry point for image requests.
pub struct ImagePipeline {
    encoded: Arc<dyn Producer<EncodedImage>>,
    decoded: Arc<dyn Producer<Handle<DecodedImage>>>,
    tiers: CacheTiers,
    pool: Arc<ByteArrayPool>,
    counter: Arc<BitmapCounter>,
    trim_registry: MemoryTrimmableRegistry,
    listener: Arc<dyn ProducerListener>,
    disk_cache_enabled: bool,
}

impl ImagePipeline {
    pub fn builder(runtime: RuntimeHandle) -> ImagePipelineBuilder {
        ImagePipelineBuilder::new(runtime)
    }

    /// Fetches the encoded bytes of `request`.
    pub fn fetch_encoded(&self, request: ImageRequest) -> RequestHandle<EncodedImage> {
        self.submit(&self.encoded, request)
    }

    /// Fetches and decodes `request`.
    pub fn fetch_decoded(&self, request: ImageRequest) -> RequestHandle<Handle<DecodedImage>> {
        self.submit(&self.decoded, request)
    }

    fn submit<T>(&self, producer: &Arc<dyn Producer<T>>, request: ImageRequest) -> RequestHandle<T>
    where
        T: CloneableResult + Send + 'static,
    {
        let request = if self.disk_cache_enabled {
            request
        } else {
            request.into_builder().disk_cache_enabled(false).build()
        };
        let context = ProducerContext::new(request, Arc::clone(&self.listener));
        debug!(request_id = %context.id(), uri = context.request().source_uri(), producer = producer.name(), "Submitting request");

        let (consumer, receiver) = ChannelConsumer::create();
        producer.produce_results(BaseConsumer::boxed(Box::new(consumer)), Arc::clone(&context));
        RequestHandle { context, receiver }
    }

    /// Signals memory pressure to the pool; returns the trimmables notified.
    pub fn trim_memory(&self, level: TrimLevel) -> usize {
        self.trim_registry.trim(level)
    }

    pub fn byte_pool(&self) -> &Arc<ByteArrayPool> {
        &self.pool
    }

    pub fn bitmap_counter(&self) -> &Arc<BitmapCounter> {
        &self.counter
    }

    pub fn cache_tiers(&self) -> &CacheTiers {
        &self.tiers
    }

    /// `(default, small)` tier statistics.
    pub fn cache_stats(&self) -> (TierStatsSnapshot, TierStatsSnapshot) {
        (self.tiers.default.stats(), self.tiers.small.stats())
    }

    /// Waits until no disk cache write is in flight, up to `timeout`.
    ///
    /// Returns `false` if writes were still pending when time ran out.
    pub async fn flush_disk_writes(&self, timeout: Duration) -> bool {
        let pending = || self.tiers.default.pending_writes() + self.tiers.small.pending_writes();
        let deadline = tokio::time::Instant::now() + timeout;
        while pending() > 0 {
            if tokio::time::Instant::now() >= deadline {
                debug!(pending = pending(), "Disk cache writes still pending");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// Empties both disk tiers.
    pub async fn clear_disk_caches(&self) -> Result<(), CacheError> {
        self.tiers.default.clear_all().await?;
        self.tiers.small.clear_all().await
    }
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("tiers", &self.tiers)
            .field("pool", &self.pool)
            .field("counter", &self.counter)
            .field("disk_cache_enabled", &self.disk_cache_enabled)
            .finish()
    }
}

/// A submitted request.
pub struct RequestHandle<T> {
    context: Arc<ProducerContext>,
    receiver: oneshot::Receiver<RequestOutcome<T>>,
}

impl<T> RequestHandle<T> {
    pub fn id(&self) -> RequestId {
        self.context.id()
    }

    pub fn context(&self) -> &Arc<ProducerContext> {
        &self.context
    }

    /// Requests cancellation; returns `false` if already requested.
    pub fn cancel(&self) -> bool {
        self.context.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.context.is_cancelled()
    }

    /// Waits for the terminal outcome.
    pub async fn outcome(self) -> RequestOutcome<T> {
        received(self.receiver.await)
    }

    /// Waits for the terminal outcome, cancelling the request if it has not
    /// finished within `timeout`.
    ///
    /// Cancellation is cooperative, so the outcome after a timeout may still
    /// be a result that was already on its way.
    pub async fn outcome_or_cancel_after(self, timeout: Duration) -> RequestOutcome<T> {
        let Self {
            context,
            mut receiver,
        } = self;
        tokio::select! {
            result = &mut receiver => received(result),
            _ = tokio::time::sleep(timeout) => {
                debug!(request_id = %context.id(), timeout_ms = timeout.as_millis() as u64, "Request timed out, cancelling");
                context.cancel();
                received(receiver.await)
            }
        }
    }
}

fn received<T>(result: Result<RequestOutcome<T>, oneshot::error::RecvError>) -> RequestOutcome<T> {
    result.unwrap_or_else(|_| {
        RequestOutcome::Failed(PipelineError::Internal(
            "request dropped without a terminal result".to_string(),
        ))
    })
}

impl<T> std::fmt::Debug for RequestHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.context.id())
            .field("cancelled", &self.context.is_cancelled())
            .finish()
    }
}
