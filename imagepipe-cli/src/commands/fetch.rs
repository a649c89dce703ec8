//! Single request through the pipeline.

use clap::Args;
use imagepipe::config::format_size;
use imagepipe::decoder::{BitmapConfig, DecodeOptions};
use imagepipe::pipeline::{ImagePipeline, ImagePipelineBuilder, RequestHandle};
use imagepipe::producers::{
    CacheChoice, ImageRequest, PipelineError, RequestLevel, RequestOutcome,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::common::{load_config, start_logging};
use crate::error::CliError;

/// How long to wait for background cache writes before exiting.
const DISK_WRITE_GRACE: Duration = Duration::from_secs(5);

/// Arguments for `imagepipe fetch`.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Source URI: file://, data:, or a plain local path
    pub uri: String,

    /// Write the encoded bytes to this file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Decode the image and report its dimensions
    #[arg(long)]
    pub decode: bool,

    /// Decode to RGB instead of RGBA
    #[arg(long, requires = "decode")]
    pub rgb: bool,

    /// Prefer the small disk cache tier
    #[arg(long)]
    pub small: bool,

    /// Bypass both disk cache tiers for this request
    #[arg(long)]
    pub no_disk_cache: bool,

    /// Only answer from the disk cache; never read the source
    #[arg(long, conflicts_with = "no_disk_cache")]
    pub cache_only: bool,

    /// Cancel the request if it has not finished after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print disk cache statistics after the request
    #[arg(long)]
    pub stats: bool,
}

impl FetchArgs {
    fn to_request(&self) -> ImageRequest {
        let mut builder = ImageRequest::builder(self.uri.clone())
            .cache_choice(if self.small {
                CacheChoice::Small
            } else {
                CacheChoice::Default
            })
            .disk_cache_enabled(!self.no_disk_cache);
        if self.cache_only {
            builder = builder.lowest_permitted_request_level(RequestLevel::DiskCache);
        }
        if self.rgb {
            builder = builder.decode_options(DecodeOptions {
                config: BitmapConfig::Rgb8,
            });
        }
        builder.build()
    }
}

/// Run the fetch command.
pub async fn run(args: FetchArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let (config, _) = load_config(config_path)?;
    let _logging = start_logging(&config)?;

    let pipeline =
        ImagePipelineBuilder::from_config(&config, tokio::runtime::Handle::current())?.build();
    let request = args.to_request();
    info!(uri = %args.uri, decode = args.decode, "Fetching image");

    let result = if args.decode {
        fetch_decoded(&pipeline, &args, request).await
    } else {
        fetch_encoded(&pipeline, &args, request).await
    };
    if !pipeline.flush_disk_writes(DISK_WRITE_GRACE).await {
        warn!("Exiting with disk cache writes still in flight");
    }

    if args.stats {
        let (default, small) = pipeline.cache_stats();
        println!("{}", default.format("default"));
        println!("{}", small.format("small"));
    }
    result
}

async fn fetch_encoded(
    pipeline: &ImagePipeline,
    args: &FetchArgs,
    request: ImageRequest,
) -> Result<(), CliError> {
    let mut image = match wait(pipeline.fetch_encoded(request), args.timeout_ms).await {
        RequestOutcome::Completed(Some(image)) => image,
        other => return Err(failure(other, &args.uri)),
    };

    let described = {
        let bytes = image.bytes().map_err(|e| CliError::Request(PipelineError::Lifetime(e)))?;
        if let Some(path) = &args.output {
            std::fs::write(path, bytes).map_err(|error| CliError::FileWrite {
                path: path.display().to_string(),
                error,
            })?;
        }
        format!("{} image, {}", image.format(), format_size(bytes.len()))
    };
    println!("{}: {}", args.uri, described);
    if let Some(path) = &args.output {
        println!("Saved to {}", path.display());
    }
    let _ = image.close();
    Ok(())
}

async fn fetch_decoded(
    pipeline: &ImagePipeline,
    args: &FetchArgs,
    request: ImageRequest,
) -> Result<(), CliError> {
    if args.output.is_some() {
        println!("Note: --output is ignored with --decode");
    }
    let mut handle = match wait(pipeline.fetch_decoded(request), args.timeout_ms).await {
        RequestOutcome::Completed(Some(handle)) => handle,
        other => return Err(failure(other, &args.uri)),
    };

    {
        let image = handle.get().map_err(|e| CliError::Request(PipelineError::Lifetime(e)))?;
        println!(
            "{}: {} image, {}x{}, {} decoded",
            args.uri,
            image.format(),
            image.width(),
            image.height(),
            format_size(image.size_in_bytes())
        );
    }
    let _ = handle.close();
    Ok(())
}

async fn wait<T>(handle: RequestHandle<T>, timeout_ms: Option<u64>) -> RequestOutcome<T> {
    match timeout_ms {
        Some(ms) => handle.outcome_or_cancel_after(Duration::from_millis(ms)).await,
        None => handle.outcome().await,
    }
}

fn failure<T>(outcome: RequestOutcome<T>, uri: &str) -> CliError {
    match outcome {
        RequestOutcome::Failed(e) => CliError::Request(e),
        RequestOutcome::Cancelled => CliError::Cancelled {
            uri: uri.to_string(),
        },
        RequestOutcome::Completed(_) => CliError::NoResult {
            uri: uri.to_string(),
        },
    }
}
