//! Cache Metrics System
//!
//! Metrics are reported as a `BTreeMap<String, f64>` so that keys always come
//! out in the same order. That keeps log lines, test assertions and exported
//! snapshots comparable between runs.
//!
//! Two kinds of values are reported:
//! - **Event counters** (registrations, evictions, saves, ...) accumulated in
//!   [`MruCacheMetrics`] as the cache works.
//! - **Gauges** (`memory_used`, `memory_to_write`, budgets, entry counts) read
//!   from the cache's authoritative state at the moment of the snapshot.

use std::collections::BTreeMap;

pub mod mru;

pub use mru::MruCacheMetrics;

/// Trait implemented by anything that can report cache metrics.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Short name identifying the eviction policy, e.g. `"MRU"`.
    fn algorithm_name(&self) -> &'static str;
}
