#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Object Lifecycle
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                                                                      │
//! │   not tracked ──loading()──▶ resident ──over budget──▶ pending write │
//! │        ▲                       ▲  │                        │         │
//! │        │                       │  └── touch()/loading() ◀──┘         │
//! │        │                       │      (promote / rescue)             │
//! │        └──────────── save() during write_old_objects() ◀─────────────┤
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Operation | Cost | Effect |
//! |-----------|------|--------|
//! | [`MruCache::loading`] | O(1) + evictions | register as most recent, enforce budget, maybe flush |
//! | [`MruCache::touch`] | O(1) + evictions | promote, re-read cost |
//! | [`MruCache::access`] | `load()` + `loading` | transparent reload of untracked objects |
//! | [`MruCache::write_old_objects`] | one `save()` per buffered object | position-ordered flush |
//! | [`MruCache::flush_all`] | one `save()` per tracked object | evict everything, then flush |
//! | [`MruCache::remove`] | O(1) / O(log n) | forget an object without saving |
//!
//! ## Budgets
//!
//! ```rust
//! use disk_mru::config::MruCacheConfig;
//! use disk_mru::MruCache;
//!
//! let config = MruCacheConfig {
//!     memory_available: 100,
//!     write_buffer_threshold: 50,
//! };
//! let cache: MruCache = MruCache::init(config);
//! assert_eq!(cache.memory_used(), 0);
//! assert_eq!(cache.memory_to_write(), 0);
//! ```
//!
//! ## Modules
//!
//! - [`cacheable`]: the capability contract managed objects implement
//! - [`config`]: cache configuration
//! - [`error`]: error types
//! - [`metrics`]: metrics reporting

/// The capability contract managed objects implement.
///
/// Provides the [`Cacheable`] trait and the [`PersistError`] its
/// `save`/`load` hooks return.
pub mod cacheable;

/// Cache configuration structures.
pub mod config;

/// Error types for cache operations and flushes.
pub mod error;

/// Cache metrics system.
///
/// Event counters plus a snapshot of live gauges, reported in
/// deterministic key order.
pub mod metrics;

/// Per-object bookkeeping held by the cache.
pub(crate) mod entry;

/// Arena-backed doubly linked list used for recency ordering.
///
/// Internal infrastructure; nodes are addressed by generation-checked
/// handles so that the identity index can point into the list without raw
/// pointers.
pub(crate) mod list;

/// Single-threaded bookkeeping core: recency list, identity index, write
/// buffer and counters.
pub(crate) mod mru;

/// The thread-safe cache.
mod cache;

pub use cache::MruCache;
pub use cacheable::{Cacheable, PersistError};
pub use config::MruCacheConfig;
pub use error::{CacheError, FlushError, FlushFailure};
pub use metrics::{CacheMetrics, MruCacheMetrics};
