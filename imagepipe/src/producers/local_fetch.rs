//! Local byte sources: `data:` URIs and files.

use super::context::ProducerContext;
use super::contract::{BoxConsumer, Producer, Status};
use super::error::{FetchError, PipelineError};
use crate::encoded::{EncodedImage, PooledByteBufferFactory};
use crate::executor::BlockingExecutor;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const DATA_FETCH_PRODUCER_NAME: &str = "DataFetchProducer";
pub const LOCAL_FILE_FETCH_PRODUCER_NAME: &str = "LocalFileFetchProducer";
pub const LOCAL_FETCH_PRODUCER_NAME: &str = "LocalFetchProducer";

const DATA_SCHEME: &str = "data:";
const FILE_SCHEME: &str = "file://";

/// Standard alphabet, padding optional.
const DATA_URI_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes the payload of a `data:` URI.
///
/// The format is `data:[<mediatype>][;param=value]*[;base64],<data>`. The
/// payload is base-64 when the last parameter before the comma is `base64`
/// and percent-escaped otherwise. Charset parameters are ignored.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FetchError> {
    let rest = uri
        .strip_prefix(DATA_SCHEME)
        .ok_or_else(|| FetchError::MalformedDataUri(truncate(uri)))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::MalformedDataUri(truncate(uri)))?;

    if is_base64(header) {
        let compact: Vec<u8> = payload
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        Ok(DATA_URI_BASE64.decode(compact)?)
    } else {
        Ok(percent_decode(payload.as_bytes()))
    }
}

fn is_base64(header: &str) -> bool {
    header.contains(';') && header.rsplit(';').next() == Some("base64")
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
fn percent_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' && i + 2 < input.len() {
            if let (Some(hi), Some(lo)) = (hex(input[i + 1]), hex(input[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn hex(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

fn truncate(uri: &str) -> String {
    uri.chars().take(64).collect()
}

fn encoded_image(
    buffers: &PooledByteBufferFactory,
    bytes: &[u8],
) -> Result<EncodedImage, PipelineError> {
    let buffer = buffers.new_byte_buffer(bytes)?;
    Ok(EncodedImage::new(buffer)?)
}

/// Delivers a fetch result and the matching listener finish.
fn deliver(
    producer: &'static str,
    result: Result<EncodedImage, PipelineError>,
    mut consumer: BoxConsumer<EncodedImage>,
    context: &ProducerContext,
) {
    let listener = context.listener();
    match result {
        Ok(image) => {
            debug!(request_id = %context.id(), producer, size = image.size(), format = %image.format(), "Fetched local image");
            listener.on_producer_finish_with_success(context.id(), producer, None);
            consumer.on_new_result(Some(&image), Status::Last);
        }
        Err(e) => {
            listener.on_producer_finish_with_failure(context.id(), producer, &e, None);
            consumer.on_failure(e);
        }
    }
}

fn deliver_cancellation(
    producer: &'static str,
    mut consumer: BoxConsumer<EncodedImage>,
    context: &ProducerContext,
) {
    context
        .listener()
        .on_producer_finish_with_cancellation(context.id(), producer, None);
    consumer.on_cancellation();
}

/// Fetches `data:` URIs on the calling thread.
#[derive(Debug, Clone)]
pub struct DataFetchProducer {
    buffers: PooledByteBufferFactory,
}

impl DataFetchProducer {
    pub fn new(buffers: PooledByteBufferFactory) -> Self {
        Self { buffers }
    }
}

impl Producer<EncodedImage> for DataFetchProducer {
    fn produce_results(&self, consumer: BoxConsumer<EncodedImage>, context: Arc<ProducerContext>) {
        context
            .listener()
            .on_producer_start(context.id(), DATA_FETCH_PRODUCER_NAME);
        if context.is_cancelled() {
            deliver_cancellation(DATA_FETCH_PRODUCER_NAME, consumer, &context);
            return;
        }
        let result = decode_data_uri(context.request().source_uri())
            .map_err(PipelineError::from)
            .and_then(|bytes| encoded_image(&self.buffers, &bytes));
        deliver(DATA_FETCH_PRODUCER_NAME, result, consumer, &context);
    }

    fn name(&self) -> &'static str {
        DATA_FETCH_PRODUCER_NAME
    }
}

/// Fetches `file://` URIs and bare paths on a blocking executor.
pub struct LocalFileFetchProducer<X> {
    executor: Arc<X>,
    buffers: PooledByteBufferFactory,
}

impl<X: BlockingExecutor> LocalFileFetchProducer<X> {
    pub fn new(executor: Arc<X>, buffers: PooledByteBufferFactory) -> Self {
        Self { executor, buffers }
    }
}

/// Filesystem path named by a `file://` URI or bare path.
pub fn file_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix(FILE_SCHEME).unwrap_or(uri))
}

impl<X: BlockingExecutor> Producer<EncodedImage> for LocalFileFetchProducer<X> {
    fn produce_results(&self, consumer: BoxConsumer<EncodedImage>, context: Arc<ProducerContext>) {
        context
            .listener()
            .on_producer_start(context.id(), LOCAL_FILE_FETCH_PRODUCER_NAME);

        let path = file_path(context.request().source_uri());
        let buffers = self.buffers.clone();
        self.executor.spawn_blocking(move || {
            if context.is_cancelled() {
                deliver_cancellation(LOCAL_FILE_FETCH_PRODUCER_NAME, consumer, &context);
                return;
            }
            let result = match std::fs::read(&path) {
                Ok(bytes) => encoded_image(&buffers, &bytes),
                Err(source) => Err(FetchError::Read { path, source }.into()),
            };
            deliver(LOCAL_FILE_FETCH_PRODUCER_NAME, result, consumer, &context);
        });
    }

    fn name(&self) -> &'static str {
        LOCAL_FILE_FETCH_PRODUCER_NAME
    }
}

/// Routes a request to the local source its URI names.
pub struct LocalFetchProducer<X> {
    data: DataFetchProducer,
    file: LocalFileFetchProducer<X>,
}

impl<X: BlockingExecutor> LocalFetchProducer<X> {
    pub fn new(executor: Arc<X>, buffers: PooledByteBufferFactory) -> Self {
        Self {
            data: DataFetchProducer::new(buffers.clone()),
            file: LocalFileFetchProducer::new(executor, buffers),
        }
    }
}

impl<X: BlockingExecutor> Producer<EncodedImage> for LocalFetchProducer<X> {
    fn produce_results(&self, consumer: BoxConsumer<EncodedImage>, context: Arc<ProducerContext>) {
        let uri = context.request().source_uri();
        if uri.starts_with(DATA_SCHEME) {
            self.data.produce_results(consumer, context);
        } else if uri.starts_with(FILE_SCHEME) || !uri.contains("://") {
            self.file.produce_results(consumer, context);
        } else {
            context
                .listener()
                .on_producer_start(context.id(), LOCAL_FETCH_PRODUCER_NAME);
            let error = PipelineError::UnsupportedUri(truncate(uri));
            deliver(LOCAL_FETCH_PRODUCER_NAME, Err(error), consumer, &context);
        }
    }

    fn name(&self) -> &'static str {
        LOCAL_FETCH_PRODUCER_NAME
    }
}
