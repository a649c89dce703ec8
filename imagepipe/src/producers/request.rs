//! Image requests.

use crate::decoder::DecodeOptions;

/// How far down the chain a request may go, ordered from most to least
/// expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RequestLevel {
    /// Any stage, including fetching from the source
    #[default]
    FullFetch,
    /// Stop at the disk cache
    DiskCache,
    /// Stop at the encoded memory cache
    EncodedMemoryCache,
    /// Stop at the bitmap memory cache
    BitmapMemoryCache,
}

/// Disk cache tier a request prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheChoice {
    Small,
    #[default]
    Default,
}

/// An immutable description of one image to load.
///
/// # Example
///
/// ```
/// use imagepipe::producers::{CacheChoice, ImageRequest, RequestLevel};
///
/// let request = ImageRequest::builder("file:///tmp/avatar.png")
///     .cache_choice(CacheChoice::Small)
///     .lowest_permitted_request_level(RequestLevel::DiskCache)
///     .build();
/// assert_eq!(request.cache_choice(), CacheChoice::Small);
/// assert!(request.is_disk_cache_enabled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    source_uri: String,
    cache_choice: CacheChoice,
    disk_cache_enabled: bool,
    lowest_permitted_request_level: RequestLevel,
    decode_options: DecodeOptions,
}

impl ImageRequest {
    /// A request with default settings.
    pub fn new(source_uri: impl Into<String>) -> Self {
        Self::builder(source_uri).build()
    }

    pub fn builder(source_uri: impl Into<String>) -> ImageRequestBuilder {
        ImageRequestBuilder {
            request: ImageRequest {
                source_uri: source_uri.into(),
                cache_choice: CacheChoice::default(),
                disk_cache_enabled: true,
                lowest_permitted_request_level: RequestLevel::default(),
                decode_options: DecodeOptions::default(),
            },
        }
    }

    /// Builder seeded with this request's settings.
    pub fn into_builder(self) -> ImageRequestBuilder {
        ImageRequestBuilder { request: self }
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn cache_choice(&self) -> CacheChoice {
        self.cache_choice
    }

    pub fn is_disk_cache_enabled(&self) -> bool {
        self.disk_cache_enabled
    }

    pub fn lowest_permitted_request_level(&self) -> RequestLevel {
        self.lowest_permitted_request_level
    }

    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode_options
    }
}

/// Builder for [`ImageRequest`].
#[derive(Debug, Clone)]
pub struct ImageRequestBuilder {
    request: ImageRequest,
}

impl ImageRequestBuilder {
    pub fn cache_choice(mut self, choice: CacheChoice) -> Self {
        self.request.cache_choice = choice;
        self
    }

    pub fn disk_cache_enabled(mut self, enabled: bool) -> Self {
        self.request.disk_cache_enabled = enabled;
        self
    }

    pub fn lowest_permitted_request_level(mut self, level: RequestLevel) -> Self {
        self.request.lowest_permitted_request_level = level;
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.request.decode_options = options;
        self
    }

    pub fn build(self) -> ImageRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = ImageRequest::new("data:,x");
        assert_eq!(request.source_uri(), "data:,x");
        assert_eq!(request.cache_choice(), CacheChoice::Default);
        assert!(request.is_disk_cache_enabled());
        assert_eq!(
            request.lowest_permitted_request_level(),
            RequestLevel::FullFetch
        );
    }

    #[test]
    fn test_request_levels_are_ordered() {
        assert!(RequestLevel::FullFetch < RequestLevel::DiskCache);
        assert!(RequestLevel::DiskCache < RequestLevel::EncodedMemoryCache);
        assert!(RequestLevel::EncodedMemoryCache < RequestLevel::BitmapMemoryCache);
    }
}
