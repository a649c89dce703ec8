//! Per-tier cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one cache tier.
#[derive(Debug, Default)]
pub struct TierStats {
    staging_hits: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    read_failures: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl TierStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit served from an in-flight write.
    pub fn record_staging_hit(&self) {
        self.staging_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a hit served from the blob store.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TierStatsSnapshot {
        TierStatsSnapshot {
            staging_hits: self.staging_hits.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TierStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierStatsSnapshot {
    pub staging_hits: u64,
    pub hits: u64,
    pub misses: u64,
    pub read_failures: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl TierStatsSnapshot {
    /// Calculate hit rate (0.0 to 1.0), counting staging hits as hits.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.staging_hits + self.hits;
        let total = hits + self.misses + self.read_failures;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Format statistics as a human-readable block.
    pub fn format(&self, tier: &str) -> String {
        format!(
            r#"{} TIER
  Hits:        {} ({} staged)
  Misses:      {}
  Failures:    {}
  Hit Rate:    {:.1}%
  Writes:      {}
  Write Fail:  {}
"#,
            tier.to_uppercase(),
            self.hits + self.staging_hits,
            self.staging_hits,
            self.misses,
            self.read_failures,
            self.hit_rate() * 100.0,
            self.writes,
            self.write_failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(TierStats::new().snapshot().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_staging_hits() {
        let stats = TierStats::new();
        stats.record_hit();
        stats.record_staging_hit();
        stats.record_miss();
        stats.record_read_failure();
        assert_eq!(stats.snapshot().hit_rate(), 0.5);
    }

    #[test]
    fn test_format_contains_counts() {
        let stats = TierStats::new();
        stats.record_write();
        stats.record_write_failure();
        let text = stats.snapshot().format("small");
        assert!(text.starts_with("SMALL TIER"));
        assert!(text.contains("Writes:      1"));
        assert!(text.contains("Write Fail:  1"));
    }
}
