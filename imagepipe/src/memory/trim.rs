//! Memory-pressure signalling.
//!
//! Components that hold reclaimable memory register with a
//! [`MemoryTrimmableRegistry`]. When the host signals pressure, the registry
//! forwards it to every live registrant.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// How aggressively to give memory back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrimLevel {
    /// Release about half of the reclaimable memory.
    Moderate,
    /// Release all reclaimable memory.
    Critical,
}

impl TrimLevel {
    /// Number of free entries to keep out of `len`.
    pub(crate) fn retained(self, len: usize) -> usize {
        match self {
            TrimLevel::Moderate => len / 2,
            TrimLevel::Critical => 0,
        }
    }
}

/// A component that can shed cached memory on demand.
pub trait MemoryTrimmable: Send + Sync {
    fn trim(&self, level: TrimLevel);
}

/// Registry of trimmable components.
///
/// Registrants are held weakly, so registering never extends a
/// component's lifetime.
#[derive(Default)]
pub struct MemoryTrimmableRegistry {
    entries: Mutex<Vec<Weak<dyn MemoryTrimmable>>>,
}

impl MemoryTrimmableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trimmable: Weak<dyn MemoryTrimmable>) {
        self.entries.lock().push(trimmable);
    }

    /// Delivers a trim signal; returns how many live components received it.
    pub fn trim(&self, level: TrimLevel) -> usize {
        let live: Vec<Arc<dyn MemoryTrimmable>> = {
            let mut entries = self.entries.lock();
            entries.retain(|w| w.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };

        debug!(?level, registrants = live.len(), "Delivering memory trim");
        for trimmable in &live {
            trimmable.trim(level);
        }
        live.len()
    }

    /// Number of registrants that are still alive.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryTrimmableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTrimmableRegistry")
            .field("registrants", &self.len())
            .finish()
    }
}
