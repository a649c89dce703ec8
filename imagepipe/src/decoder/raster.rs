//! Default decoder backed by the `image` crate.

use super::{Bitmap, BitmapConfig, DecodeError, DecodeOptions, Decoder};
use crate::encoded::ImageFormat;

/// Plain in-memory pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBitmap {
    width: u32,
    height: u32,
    config: BitmapConfig,
    pixels: Vec<u8>,
}

impl RasterBitmap {
    pub fn config(&self) -> BitmapConfig {
        self.config
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl Bitmap for RasterBitmap {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn size_in_bytes(&self) -> usize {
        self.pixels.len()
    }
}

/// Decodes JPEG, PNG, GIF and BMP through `image::load_from_memory`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Box<dyn Bitmap>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        let decoded = ::image::load_from_memory(bytes).map_err(|e| DecodeError::Undecodable {
            format: ImageFormat::detect(bytes),
            reason: e.to_string(),
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        let pixels = match options.config {
            BitmapConfig::Rgba8 => decoded.into_rgba8().into_raw(),
            BitmapConfig::Rgb8 => decoded.into_rgb8().into_raw(),
        };
        Ok(Box::new(RasterBitmap {
            width,
            height,
            config: options.config,
            pixels,
        }))
    }
}
