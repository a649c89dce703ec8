//! Container format sniffing for encoded images.

use std::fmt;

/// End-of-image marker terminating every complete JPEG stream.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";
const BMP_MAGIC: &[u8] = b"BM";

/// Detected encoding of an image's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    #[default]
    Unknown,
}

impl ImageFormat {
    /// Detects the format from leading magic bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(JPEG_MAGIC) {
            ImageFormat::Jpeg
        } else if bytes.starts_with(PNG_MAGIC) {
            ImageFormat::Png
        } else if bytes.starts_with(GIF87_MAGIC) || bytes.starts_with(GIF89_MAGIC) {
            ImageFormat::Gif
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            ImageFormat::Webp
        } else if bytes.starts_with(BMP_MAGIC) {
            ImageFormat::Bmp
        } else {
            ImageFormat::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns `true` if a JPEG stream ends with its EOI marker.
pub fn is_complete_jpeg(bytes: &[u8]) -> bool {
    bytes.ends_with(&JPEG_EOI)
}
