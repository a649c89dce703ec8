//! End-to-end tests for the assembled pipeline.
//!
//! These tests verify the complete request workflow including:
//! - Fetching data URIs and files through the disk tiers
//! - Serving repeat requests from the disk cache
//! - Decoding with bitmap admission control
//! - Cancellation and timeouts

use base64::Engine;
use imagepipe::cache::{CacheKey, DiskBlobStore};
use imagepipe::config::ConfigFile;
use imagepipe::decoder::{Bitmap, DecodeError, DecodeOptions, Decoder};
use imagepipe::memory::{AdmissionError, PoolParams, TrimLevel};
use imagepipe::pipeline::{ImagePipeline, ImagePipelineBuilder};
use imagepipe::producers::{CacheChoice, ImageRequest, NoOpListener, PipelineError, RequestOutcome};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn png_data_uri(width: u32, height: u32) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes(width, height))
    )
}

fn builder() -> ImagePipelineBuilder {
    ImagePipeline::builder(tokio::runtime::Handle::current())
        .pool_params(PoolParams::powers_of_two(1024, 64 * 1024, 4, 4 << 20).unwrap())
        .listener(Arc::new(NoOpListener))
}

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Decoder that takes a fixed time per image.
struct SlowDecoder(Duration);

#[derive(Debug)]
struct OnePixel;

impl Bitmap for OnePixel {
    fn width(&self) -> u32 {
        1
    }

    fn height(&self) -> u32 {
        1
    }

    fn size_in_bytes(&self) -> usize {
        4
    }
}

impl Decoder for SlowDecoder {
    fn decode(&self, _bytes: &[u8], _options: &DecodeOptions) -> Result<Box<dyn Bitmap>, DecodeError> {
        std::thread::sleep(self.0);
        Ok(Box::new(OnePixel))
    }
}

// =============================================================================
// Encoded fetches
// =============================================================================

#[tokio::test]
async fn test_fetch_encoded_data_uri() {
    let pipeline = builder().build();
    let outcome = pipeline
        .fetch_encoded(ImageRequest::new("data:image/gif;base64,R0lGODlh"))
        .outcome()
        .await;
    match outcome {
        RequestOutcome::Completed(Some(image)) => assert_eq!(image.bytes().unwrap(), b"GIF89a"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeat_request_is_served_from_disk_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.png");
    std::fs::write(&source, png_bytes(2, 2)).unwrap();

    let pipeline = builder()
        .default_store(Arc::new(DiskBlobStore::new("default", dir.path().join("default"))))
        .small_store(Arc::new(DiskBlobStore::new("small", dir.path().join("small"))))
        .build();
    let uri = format!("file://{}", source.display());

    let first = pipeline.fetch_encoded(ImageRequest::new(uri.as_str())).outcome().await;
    assert!(first.is_completed());
    assert!(eventually(|| pipeline.cache_stats().0.writes == 1).await);

    std::fs::remove_file(&source).unwrap();
    let second = pipeline.fetch_encoded(ImageRequest::new(uri.as_str())).outcome().await;
    match second {
        RequestOutcome::Completed(Some(image)) => assert_eq!(image.bytes().unwrap(), png_bytes(2, 2)),
        other => panic!("unexpected {:?}", other),
    }

    let (default_stats, small_stats) = pipeline.cache_stats();
    assert_eq!(default_stats.writes, 1);
    assert_eq!(default_stats.hits + default_stats.staging_hits, 1);
    assert_eq!(small_stats.writes, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_disk_writes_waits_for_store() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = builder()
        .default_store(Arc::new(DiskBlobStore::new("default", dir.path().join("default"))))
        .build();

    let outcome = pipeline.fetch_encoded(ImageRequest::new("data:,GIF89a")).outcome().await;
    assert!(outcome.is_completed());
    assert!(pipeline.flush_disk_writes(Duration::from_secs(2)).await);
    assert_eq!(pipeline.cache_tiers().default.pending_writes(), 0);
    assert!(std::fs::read_dir(dir.path().join("default")).unwrap().next().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_small_cache_choice_writes_small_tier() {
    let pipeline = builder().build();
    let request = ImageRequest::builder("data:image/gif;base64,R0lGODlh")
        .cache_choice(CacheChoice::Small)
        .build();

    assert!(pipeline.fetch_encoded(request.clone()).outcome().await.is_completed());
    assert!(eventually(|| pipeline.cache_stats().1.writes == 1).await);
    assert!(pipeline.fetch_encoded(request).outcome().await.is_completed());

    let (default_stats, small_stats) = pipeline.cache_stats();
    assert_eq!(small_stats.writes, 1);
    assert_eq!(small_stats.hits + small_stats.staging_hits, 1);
    assert_eq!(default_stats.hits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_size_threshold_routes_writes_by_image_size() {
    let pipeline = builder().force_small_cache_threshold(1024).build();
    let small_uri = "data:,GIF89a";
    let large_uri = format!("data:,GIF89a{}", "x".repeat(2048));

    // Cache choice is ignored once a threshold is set.
    let large_request = ImageRequest::builder(large_uri.as_str())
        .cache_choice(CacheChoice::Small)
        .build();
    assert!(pipeline.fetch_encoded(ImageRequest::new(small_uri)).outcome().await.is_completed());
    assert!(pipeline.fetch_encoded(large_request).outcome().await.is_completed());
    assert!(pipeline.flush_disk_writes(Duration::from_secs(2)).await);

    let tiers = pipeline.cache_tiers();
    let small_key = CacheKey::new(small_uri);
    let large_key = CacheKey::new(large_uri.as_str());
    assert!(tiers.small.contains_sync(&small_key));
    assert!(!tiers.default.contains_sync(&small_key));
    assert!(tiers.default.contains_sync(&large_key));
    assert!(!tiers.small.contains_sync(&large_key));

    assert!(pipeline.fetch_encoded(ImageRequest::new(small_uri)).outcome().await.is_completed());
    let (_, small_stats) = pipeline.cache_stats();
    assert_eq!(small_stats.hits + small_stats.staging_hits, 1);
}

#[tokio::test]
async fn test_pipeline_level_disk_cache_switch() {
    let pipeline = builder().disk_cache_enabled(false).build();
    let request = ImageRequest::new("data:,plain");
    assert!(pipeline.fetch_encoded(request.clone()).outcome().await.is_completed());
    tokio::task::yield_now().await;
    assert!(pipeline.fetch_encoded(request).outcome().await.is_completed());

    let (default_stats, _) = pipeline.cache_stats();
    assert_eq!(default_stats.writes, 0);
    assert_eq!(default_stats.hits + default_stats.misses, 0);
}

#[tokio::test]
async fn test_unsupported_scheme_fails() {
    let pipeline = builder().build();
    let outcome = pipeline
        .fetch_encoded(ImageRequest::new("https://example.com/cat.png"))
        .outcome()
        .await;
    assert!(matches!(outcome, RequestOutcome::Failed(PipelineError::UnsupportedUri(_))));
}

// =============================================================================
// Decoded fetches
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_decoded_png_and_release_admission() {
    let pipeline = builder().build();
    let outcome = pipeline
        .fetch_decoded(ImageRequest::new(png_data_uri(3, 2)))
        .outcome()
        .await;

    let mut handle = match outcome {
        RequestOutcome::Completed(Some(handle)) => handle,
        other => panic!("unexpected {:?}", other),
    };
    {
        let image = handle.get().unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert_eq!(image.size_in_bytes(), 3 * 2 * 4);
    }
    assert_eq!(pipeline.bitmap_counter().count(), 1);

    handle.close().unwrap();
    let counter = pipeline.bitmap_counter();
    assert!(eventually(|| counter.count() == 0 && counter.size() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bitmap_admission_rejects_over_budget_decode() {
    let pipeline = builder().bitmap_limits(1, 1024).build();

    let first = pipeline
        .fetch_decoded(ImageRequest::new(png_data_uri(2, 2)))
        .outcome()
        .await;
    assert!(first.is_completed());

    let second = pipeline
        .fetch_decoded(ImageRequest::new(png_data_uri(4, 4)))
        .outcome()
        .await;
    match second {
        RequestOutcome::Failed(PipelineError::Decode(e)) => assert!(matches!(
            *e,
            DecodeError::TooManyBitmaps(AdmissionError::TooManyBitmaps { .. })
        )),
        other => panic!("unexpected {:?}", other),
    }

    drop(first);
    assert!(eventually(|| pipeline.bitmap_counter().count() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_undecodable_bytes_fail() {
    let pipeline = builder().build();
    let outcome = pipeline
        .fetch_decoded(ImageRequest::new("data:,not-an-image"))
        .outcome()
        .await;
    assert!(matches!(outcome, RequestOutcome::Failed(PipelineError::Decode(_))));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_before_decode_starts() {
    let pipeline = builder()
        .decoder(Arc::new(SlowDecoder(Duration::from_millis(0))))
        .build();
    let handle = pipeline.fetch_decoded(ImageRequest::new("data:image/gif;base64,R0lGODlh"));
    handle.cancel();
    assert!(!handle.cancel());
    let outcome = handle.outcome().await;
    // Cancellation is cooperative: whichever stage observes it short-circuits.
    assert!(outcome.is_cancelled() || outcome.is_completed());
    drop(outcome);
    assert!(eventually(|| pipeline.bitmap_counter().count() == 0).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_cancels_request() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("slow.png");
    std::fs::write(&source, png_bytes(1, 1)).unwrap();

    let pipeline = builder()
        .decoder(Arc::new(SlowDecoder(Duration::from_millis(300))))
        .build();
    let handle = pipeline.fetch_decoded(ImageRequest::new(source.display().to_string()));
    let context = Arc::clone(handle.context());

    let outcome = handle.outcome_or_cancel_after(Duration::from_millis(20)).await;
    assert!(context.is_cancelled());
    // The decode already in flight completes; the result is still delivered once.
    assert!(outcome.is_completed() || outcome.is_cancelled());
}

// =============================================================================
// Configuration and memory pressure
// =============================================================================

#[tokio::test]
async fn test_builder_from_config_uses_disk_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ConfigFile::default();
    config.cache.directory = dir.path().join("default");
    config.cache.small_directory = dir.path().join("small");

    let pipeline = ImagePipelineBuilder::from_config(&config, tokio::runtime::Handle::current())
        .unwrap()
        .listener(Arc::new(NoOpListener))
        .build();
    assert!(pipeline.fetch_encoded(ImageRequest::new("data:,x")).outcome().await.is_completed());
}

#[tokio::test]
async fn test_builder_rejects_shared_tier_directory() {
    let mut config = ConfigFile::default();
    config.cache.small_directory = config.cache.directory.clone();
    assert!(ImagePipelineBuilder::from_config(&config, tokio::runtime::Handle::current()).is_err());
}

#[tokio::test]
async fn test_trim_memory_empties_free_lists() {
    let pipeline = builder().build();
    let outcome = pipeline.fetch_encoded(ImageRequest::new("data:,abc")).outcome().await;
    drop(outcome);
    assert!(pipeline.byte_pool().stats().free_count() > 0);

    assert_eq!(pipeline.trim_memory(TrimLevel::Critical), 1);
    assert_eq!(pipeline.byte_pool().stats().free_count(), 0);
}
