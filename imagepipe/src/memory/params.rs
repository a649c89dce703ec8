//! Bucket layout for the byte-array pool.
//!
//! A pool's buckets are an explicit, strictly increasing list of canonical
//! sizes. A request of `n` bytes is served by the smallest bucket whose
//! canonical size is at least `n`. The list can be given directly or derived
//! from a step function via [`PoolParams::from_step_fn`].

use thiserror::Error;

/// Smallest bucket of the default layout (16 KB).
pub const DEFAULT_MIN_BUCKET_SIZE: usize = 16 * 1024;

/// Largest bucket of the default layout (4 MB).
pub const DEFAULT_MAX_BUCKET_SIZE: usize = 4 * 1024 * 1024;

/// Default ceiling on bytes handed out by a pool at once (64 MB).
pub const DEFAULT_HARD_CAP: usize = 64 * 1024 * 1024;

/// Errors from building a bucket layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolParamsError {
    #[error("bucket layout is empty")]
    NoBuckets,

    #[error("bucket sizes must be non-zero")]
    ZeroBucketSize,

    #[error("bucket sizes must be strictly increasing: {previous} followed by {next}")]
    NotIncreasing { previous: usize, next: usize },

    #[error("max_free_per_bucket must be at least 1")]
    ZeroFreeListLength,

    #[error("hard cap {hard_cap} is smaller than the largest bucket {largest}")]
    HardCapTooSmall { hard_cap: usize, largest: usize },
}

/// Configuration of a bucketed byte-array pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolParams {
    bucket_sizes: Vec<usize>,
    max_free_per_bucket: usize,
    hard_cap: usize,
}

impl PoolParams {
    /// Creates a layout from an explicit list of canonical bucket sizes.
    ///
    /// # Arguments
    ///
    /// * `bucket_sizes` - Canonical sizes, strictly increasing
    /// * `max_free_per_bucket` - Cap on each bucket's free list (roughly the
    ///   number of threads expected to use the pool concurrently)
    /// * `hard_cap` - Maximum bytes in use at once across all buckets
    pub fn new(
        bucket_sizes: Vec<usize>,
        max_free_per_bucket: usize,
        hard_cap: usize,
    ) -> Result<Self, PoolParamsError> {
        let Some(&largest) = bucket_sizes.last() else {
            return Err(PoolParamsError::NoBuckets);
        };
        if bucket_sizes[0] == 0 {
            return Err(PoolParamsError::ZeroBucketSize);
        }
        for pair in bucket_sizes.windows(2) {
            if pair[1] <= pair[0] {
                return Err(PoolParamsError::NotIncreasing {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        if max_free_per_bucket == 0 {
            return Err(PoolParamsError::ZeroFreeListLength);
        }
        if hard_cap < largest {
            return Err(PoolParamsError::HardCapTooSmall { hard_cap, largest });
        }

        Ok(Self {
            bucket_sizes,
            max_free_per_bucket,
            hard_cap,
        })
    }

    /// Derives bucket sizes by repeatedly applying `step`, starting at `min`.
    ///
    /// The final bucket is clamped to `max`. A step that does not grow the
    /// size is rejected rather than looping forever.
    ///
    /// ```
    /// use imagepipe::memory::PoolParams;
    ///
    /// let params = PoolParams::from_step_fn(1024, 5000, |s| s * 2, 4, 1 << 20).unwrap();
    /// assert_eq!(params.bucket_sizes(), &[1024, 2048, 4096, 5000]);
    /// ```
    pub fn from_step_fn<F>(
        min: usize,
        max: usize,
        step: F,
        max_free_per_bucket: usize,
        hard_cap: usize,
    ) -> Result<Self, PoolParamsError>
    where
        F: Fn(usize) -> usize,
    {
        if min == 0 {
            return Err(PoolParamsError::ZeroBucketSize);
        }
        let mut sizes = vec![min];
        let mut current = min;
        while current < max {
            let next = step(current);
            if next <= current {
                return Err(PoolParamsError::NotIncreasing {
                    previous: current,
                    next,
                });
            }
            current = next.min(max);
            sizes.push(current);
        }
        Self::new(sizes, max_free_per_bucket, hard_cap)
    }

    /// Power-of-two layout between `min` and `max`.
    pub fn powers_of_two(
        min: usize,
        max: usize,
        max_free_per_bucket: usize,
        hard_cap: usize,
    ) -> Result<Self, PoolParamsError> {
        Self::from_step_fn(
            min,
            max,
            |s| s.saturating_mul(2),
            max_free_per_bucket,
            hard_cap,
        )
    }

    /// Canonical bucket sizes, ascending.
    pub fn bucket_sizes(&self) -> &[usize] {
        &self.bucket_sizes
    }

    /// Cap on the length of each bucket's free list.
    pub fn max_free_per_bucket(&self) -> usize {
        self.max_free_per_bucket
    }

    /// Maximum bytes the pool may hand out at once.
    pub fn hard_cap(&self) -> usize {
        self.hard_cap
    }

    /// Largest request the pool can serve.
    pub fn max_bucket_size(&self) -> usize {
        self.bucket_sizes[self.bucket_sizes.len() - 1]
    }

    /// Index of the bucket serving a request of `size` bytes.
    pub fn bucket_index_for_request(&self, size: usize) -> Option<usize> {
        let index = self.bucket_sizes.partition_point(|&s| s < size);
        (index < self.bucket_sizes.len()).then_some(index)
    }

    /// Index of the bucket owning a buffer of exactly `len` bytes.
    pub fn bucket_index_for_buffer(&self, len: usize) -> Option<usize> {
        self.bucket_sizes.binary_search(&len).ok()
    }
}

impl Default for PoolParams {
    fn default() -> Self {
        let mut bucket_sizes = Vec::new();
        let mut size = DEFAULT_MIN_BUCKET_SIZE;
        while size <= DEFAULT_MAX_BUCKET_SIZE {
            bucket_sizes.push(size);
            size *= 2;
        }
        Self {
            bucket_sizes,
            max_free_per_bucket: crate::config::num_cpus(),
            hard_cap: DEFAULT_HARD_CAP,
        }
    }
}
