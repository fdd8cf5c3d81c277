//! MRU Cache Metrics
//!
//! Event counters for the disk-backed MRU cache.

use std::collections::BTreeMap;

/// Event counters for an [`MruCache`](crate::MruCache).
///
/// Gauges that mirror live state (the memory counters, budgets, entry
/// counts) are not stored here; the cache adds them when a snapshot is taken
/// so they can never drift from the values that drive eviction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MruCacheMetrics {
    /// Objects registered through `loading` (including re-registrations).
    pub registrations: u64,
    /// Promotions of already-resident objects to the most recent position.
    pub promotions: u64,
    /// Objects moved from the recency list into the write buffer.
    pub evictions: u64,
    /// Objects pulled back out of the write buffer before being saved.
    pub rescued_from_write_buffer: u64,
    /// Flushes that found at least one buffered object.
    pub flushes: u64,
    /// Successful `save()` calls.
    pub objects_saved: u64,
    /// Failed `save()` calls.
    pub save_failures: u64,
    /// Total cost written out by successful saves.
    pub cost_saved: u64,
    /// Successful `load()` calls made on behalf of callers.
    pub loads: u64,
    /// Failed `load()` calls.
    pub load_failures: u64,
}

impl MruCacheMetrics {
    /// Creates a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one flush pass.
    pub fn record_flush(&mut self, saved: u64, cost_saved: u64, failed: u64) {
        if saved + failed > 0 {
            self.flushes += 1;
        }
        self.objects_saved += saved;
        self.cost_saved = self.cost_saved.saturating_add(cost_saved);
        self.save_failures += failed;
    }

    /// Fraction of attempted saves that failed, or 0.0 if nothing was saved yet.
    pub fn save_failure_rate(&self) -> f64 {
        let attempts = self.objects_saved + self.save_failures;
        if attempts > 0 {
            self.save_failures as f64 / attempts as f64
        } else {
            0.0
        }
    }

    /// Converts the counters to a BTreeMap for reporting.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        metrics.insert("registrations".to_string(), self.registrations as f64);
        metrics.insert("promotions".to_string(), self.promotions as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert(
            "rescued_from_write_buffer".to_string(),
            self.rescued_from_write_buffer as f64,
        );

        metrics.insert("flushes".to_string(), self.flushes as f64);
        metrics.insert("objects_saved".to_string(), self.objects_saved as f64);
        metrics.insert("save_failures".to_string(), self.save_failures as f64);
        metrics.insert("cost_saved".to_string(), self.cost_saved as f64);
        metrics.insert("save_failure_rate".to_string(), self.save_failure_rate());

        metrics.insert("loads".to_string(), self.loads as f64);
        metrics.insert("load_failures".to_string(), self.load_failures as f64);

        metrics
    }
}
