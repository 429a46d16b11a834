use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for one [`TerrainCache`](crate::TerrainCache).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// Requests accepted into the pipeline as new loads.
    pub requested: u64,
    /// Requests merged into a load that was already in the pipeline.
    pub coalesced: u64,
    /// Instance requests refused because the parent had no resident payload.
    pub rejected: u64,
    pub installed: u64,
    /// Completed loads thrown away because the parent was evicted before they could be installed.
    pub discarded: u64,
    /// Requests skipped because their target became resident by another path.
    pub stale: u64,
    /// Completed loads that never found a free retire slot.
    pub dropped: u64,
    pub load_failures: u64,
    pub worker_iterations: u64,
    /// Average blocking load time.
    pub average_load_us: u32,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {} (coalesced {}, rejected {}), installed {}, discarded {}, stale {}, dropped {}, failed {}, \
             {} loader iterations, {} us per load",
            self.requested,
            self.coalesced,
            self.rejected,
            self.installed,
            self.discarded,
            self.stale,
            self.dropped,
            self.load_failures,
            self.worker_iterations,
            self.average_load_us,
        )
    }
}

/// Counters bumped by the loader thread.
#[derive(Debug, Default)]
pub(crate) struct LoaderCounters {
    pub iterations: AtomicU64,
    pub dropped: AtomicU64,
    pub failures: AtomicU64,
}

impl LoaderCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn merge_into(&self, stats: &mut CacheStats) {
        stats.worker_iterations = self.iterations.load(Ordering::Relaxed);
        stats.dropped = self.dropped.load(Ordering::Relaxed);
        stats.load_failures = self.failures.load(Ordering::Relaxed);
    }
}
