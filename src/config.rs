//! Cache Configuration Module
//!
//! [`MruCacheConfig`] carries the two budgets an [`MruCache`](crate::MruCache)
//! is built with. It is a plain struct with public fields: create it with
//! every field set and hand it to [`MruCache::init`](crate::MruCache::init).
//!
//! # Sizing Guidelines
//!
//! Both budgets are expressed in the same opaque cost unit that
//! [`Cacheable::memory_size`](crate::Cacheable::memory_size) reports. That is
//! often bytes, but a cache of event blocks may just as well count events.
//!
//! - **`memory_available`**: how much cost may stay resident. Exceeding it
//!   after a registration evicts from the least recently used end.
//! - **`write_buffer_threshold`**: how much evicted cost is accumulated before
//!   the write buffer is flushed in one position-sorted sweep. Larger values
//!   mean fewer, longer, more sequential flushes.
//!
//! ```text
//! Peak payload memory ≈ memory_available + write_buffer_threshold + largest object
//! ```
//!
//! Evicted objects keep their payload until they are actually saved, so the
//! write buffer counts against real memory too.
//!
//! # Examples
//!
//! ```
//! use disk_mru::config::MruCacheConfig;
//! use disk_mru::MruCache;
//!
//! // 256MB resident, write out in 16MB sweeps
//! let config = MruCacheConfig {
//!     memory_available: 256 * 1024 * 1024,
//!     write_buffer_threshold: 16 * 1024 * 1024,
//! };
//! let cache: MruCache = MruCache::init(config);
//! assert_eq!(cache.memory_available(), 256 * 1024 * 1024);
//! ```

use core::fmt;

/// Configuration for an [`MruCache`](crate::MruCache).
///
/// # Fields
///
/// - `memory_available`: resident budget. Zero is legal and evicts everything
///   but the most recent object after each registration.
/// - `write_buffer_threshold`: flush trigger. Zero flushes on every eviction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MruCacheConfig {
    /// Total cost allowed in the recency list.
    pub memory_available: u64,
    /// Cost accumulated in the write buffer that triggers a flush.
    pub write_buffer_threshold: u64,
}

impl fmt::Debug for MruCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MruCacheConfig")
            .field("memory_available", &self.memory_available)
            .field("write_buffer_threshold", &self.write_buffer_threshold)
            .finish()
    }
}
