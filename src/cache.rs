//! Thread-Safe Disk-Backed MRU Cache
//!
//! [`MruCache`] keeps a working set of [`Cacheable`] objects under a memory
//! budget and hands everything that falls out of it to a write buffer, which
//! is flushed to the backing store in file-position order.
//!
//! # How It Works
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            MruCache                                  │
//! │                                                                      │
//! │  ┌──────────────── Mutex<MruSegment> ───────────────┐                │
//! │  │ recency list + id index      write buffer        │                │
//! │  │ memory_used                  memory_to_write     │                │
//! │  └──────────────────────────────────────────────────┘                │
//! │                         │ take batch (locked)                        │
//! │                         ▼                                            │
//! │  ┌──────── Mutex<()> flush lock ────────┐                            │
//! │  │ save() each object, lock NOT held    │──▶ backing store           │
//! │  └──────────────────────────────────────┘                            │
//! │                         │ re-buffer failures (locked)                │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One mutex covers the recency list, identity index, write buffer and both
//! counters, so an eviction decision always sees the counter it is changing.
//! `save()` and `load()` may block on disk and are always called with that
//! mutex released. A second mutex serialises flushes: only one batch is ever
//! being written.
//!
//! ## Why Mutex Instead of RwLock?
//!
//! Every access reorders the recency list, so there are no read-only hot
//! paths worth sharing. `parking_lot::Mutex` is smaller and cheaper than an
//! `RwLock` for this shape of workload.
//!
//! # Example
//!
//! ```
//! use disk_mru::{Cacheable, MruCache, PersistError};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! struct Page {
//!     id: u64,
//!     saves: AtomicUsize,
//! }
//!
//! impl Cacheable for Page {
//!     fn id(&self) -> u64 { self.id }
//!     fn memory_size(&self) -> u64 { 40 }
//!     fn file_position(&self) -> u64 { self.id * 4096 }
//!     fn save(&self) -> Result<(), PersistError> {
//!         self.saves.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//!     fn load(&self) -> Result<(), PersistError> { Ok(()) }
//! }
//!
//! let cache: MruCache<Page> = MruCache::new(100, 50);
//! let pages: Vec<Arc<Page>> = (1..=4)
//!     .map(|id| Arc::new(Page { id, saves: AtomicUsize::new(0) }))
//!     .collect();
//!
//! for page in &pages {
//!     cache.loading(Arc::clone(page)).unwrap();
//! }
//!
//! // Pages 1 and 2 were evicted, crossed the write threshold and were saved
//! assert_eq!(pages[0].saves.load(Ordering::Relaxed), 1);
//! assert_eq!(pages[1].saves.load(Ordering::Relaxed), 1);
//! assert_eq!(cache.memory_used(), 80);
//! assert_eq!(cache.memory_to_write(), 0);
//! ```

use crate::cacheable::Cacheable;
use crate::config::MruCacheConfig;
use crate::error::{CacheError, FlushError, FlushFailure};
use crate::metrics::CacheMetrics;
use crate::mru::MruSegment;
use core::fmt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A memory-budgeted MRU cache that writes evicted objects to disk in
/// position-sorted batches.
///
/// The cache stores `Arc<T>` handles only; the objects belong to whoever
/// created them. `T` defaults to `dyn Cacheable` so heterogeneous objects can
/// share one cache.
///
/// # Object Lifecycle
///
/// ```text
/// not tracked ──loading──▶ resident ──eviction──▶ pending write ──flush──▶ not tracked
///                             ▲                        │
///                             └──────── loading ───────┘
/// ```
///
/// `MruCache` is `Send + Sync` and is meant to be shared through an `Arc`.
pub struct MruCache<T: Cacheable + ?Sized = dyn Cacheable> {
    segment: Mutex<MruSegment<T>>,
    flush_lock: Mutex<()>,
}

impl<T: Cacheable + ?Sized> MruCache<T> {
    /// Creates a cache with the given resident budget and write threshold.
    pub fn new(memory_available: u64, write_buffer_threshold: u64) -> Self {
        Self::init(MruCacheConfig {
            memory_available,
            write_buffer_threshold,
        })
    }

    /// Creates a cache from a configuration.
    pub fn init(config: MruCacheConfig) -> Self {
        MruCache {
            segment: Mutex::new(MruSegment::new(config)),
            flush_lock: Mutex::new(()),
        }
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> MruCacheConfig {
        self.segment.lock().config()
    }

    /// Resident budget.
    pub fn memory_available(&self) -> u64 {
        self.config().memory_available
    }

    /// Write buffer cost that triggers a flush.
    pub fn write_buffer_threshold(&self) -> u64 {
        self.config().write_buffer_threshold
    }

    /// Registers an object that has just been loaded into memory.
    ///
    /// The object becomes the most recently used. If that pushes resident
    /// cost over budget, the least recently used objects are moved to the
    /// write buffer, and if the buffer then reaches its threshold it is
    /// flushed before this call returns.
    ///
    /// Registering an object that is already resident promotes it;
    /// registering one that is waiting in the write buffer takes it back out
    /// without saving it. Registering a *different* object under a tracked
    /// identifier fails with [`CacheError::IdentityConflict`].
    ///
    /// A [`CacheError::Flush`] error means the registration succeeded but the
    /// flush it triggered could not save every object.
    pub fn loading(&self, item: Arc<T>) -> Result<(), CacheError> {
        let flush_due = {
            let mut segment = self.segment.lock();
            segment.loading(item)?;
            segment.flush_due()
        };
        if flush_due {
            self.write_old_objects()?;
        }
        Ok(())
    }

    /// Marks a resident object as just used.
    ///
    /// The object's cost is re-queried and the counter adjusted by the
    /// difference, which may trigger eviction and a flush like
    /// [`loading`](Self::loading). Returns `Ok(false)` if `id` is not resident.
    pub fn touch(&self, id: u64) -> Result<bool, CacheError> {
        let (resident, flush_due) = {
            let mut segment = self.segment.lock();
            let resident = segment.touch(id);
            (resident, segment.flush_due())
        };
        if resident && flush_due {
            self.write_old_objects()?;
        }
        Ok(resident)
    }

    /// Makes sure `item` is in memory and marks it as just used.
    ///
    /// Objects the cache already tracks (resident, buffered, or being saved)
    /// still hold valid contents and are simply registered again. Anything
    /// else is loaded with [`Cacheable::load`] first; the cache lock is not
    /// held during the load. On a load failure the object is not registered.
    pub fn access(&self, item: &Arc<T>) -> Result<(), CacheError> {
        let id = item.id();
        let tracked = self.segment.lock().tracks(id);
        if !tracked {
            if let Err(source) = item.load() {
                self.segment.lock().metrics_mut().load_failures += 1;
                warn!(id, error = %source, "failed to load object");
                return Err(CacheError::Load { id, source });
            }
            self.segment.lock().metrics_mut().loads += 1;
        }
        self.loading(Arc::clone(item))
    }

    /// Saves every object in the write buffer in ascending file-position order.
    ///
    /// Objects are taken out of the buffer under the cache lock and saved
    /// with the lock released. Objects whose `save()` fails go back into the
    /// buffer with their cost and are retried by the next flush; the
    /// remaining objects are still saved. Flushing an empty buffer does
    /// nothing.
    ///
    /// Returns the number of objects saved.
    pub fn write_old_objects(&self) -> Result<usize, FlushError> {
        let _flushing = self.flush_lock.lock();
        let batch = self.segment.lock().take_write_batch();
        if batch.is_empty() {
            return Ok(0);
        }
        debug!(objects = batch.len(), "flushing write buffer");

        let mut saved = 0usize;
        let mut cost_saved = 0u64;
        let mut failed = Vec::new();
        let mut failures = Vec::new();
        for entry in batch {
            match entry.item().save() {
                Ok(()) => {
                    saved += 1;
                    cost_saved = cost_saved.saturating_add(entry.cost());
                }
                Err(source) => {
                    let position = entry.position().unwrap_or_default();
                    warn!(id = entry.id(), position, error = %source, "failed to save object, keeping it buffered");
                    failures.push(FlushFailure {
                        id: entry.id(),
                        position,
                        source,
                    });
                    failed.push(entry);
                }
            }
        }

        self.segment
            .lock()
            .finish_flush(failed, saved as u64, cost_saved);
        debug!(saved, failed = failures.len(), "write buffer flushed");

        if failures.is_empty() {
            Ok(saved)
        } else {
            Err(FlushError { saved, failures })
        }
    }

    /// Evicts every resident object and flushes the whole write buffer.
    ///
    /// Intended for shutdown, or before the backing file is closed.
    pub fn flush_all(&self) -> Result<usize, FlushError> {
        self.segment.lock().evict_all();
        self.write_old_objects()
    }

    /// Stops tracking `id` without saving it.
    ///
    /// Use this when the object itself is being destroyed. Returns the cache's
    /// handle if the object was resident or buffered.
    pub fn remove(&self, id: u64) -> Option<Arc<T>> {
        self.segment.lock().remove(id)
    }

    /// Total cost of resident objects.
    pub fn memory_used(&self) -> u64 {
        self.segment.lock().memory_used()
    }

    /// Total cost of objects waiting in the write buffer.
    pub fn memory_to_write(&self) -> u64 {
        self.segment.lock().memory_to_write()
    }

    /// Number of resident objects.
    pub fn len(&self) -> usize {
        self.segment.lock().len()
    }

    /// Returns `true` if no object is resident.
    pub fn is_empty(&self) -> bool {
        self.segment.lock().is_empty()
    }

    /// Number of objects waiting in the write buffer.
    pub fn pending_len(&self) -> usize {
        self.segment.lock().pending_len()
    }

    /// Returns `true` if `id` is resident.
    pub fn contains(&self, id: u64) -> bool {
        self.segment.lock().contains(id)
    }

    /// Returns `true` if `id` is waiting in the write buffer.
    pub fn is_pending_write(&self, id: u64) -> bool {
        self.segment.lock().is_pending_write(id)
    }

    /// Resident identifiers, most recently used first.
    pub fn resident_ids(&self) -> Vec<u64> {
        self.segment.lock().resident_ids()
    }

    /// Buffered identifiers in the order the next flush will save them.
    pub fn pending_ids(&self) -> Vec<u64> {
        self.segment.lock().pending_ids()
    }

    /// Identifier of the next object to be evicted.
    pub fn least_recent(&self) -> Option<u64> {
        self.segment.lock().least_recent()
    }
}

impl<T: Cacheable + ?Sized> CacheMetrics for MruCache<T> {
    fn metrics(&self) -> BTreeMap<String, f64> {
        let segment = self.segment.lock();
        let config = segment.config();
        let mut metrics = segment.metrics().to_btreemap();

        metrics.insert("memory_used".to_string(), segment.memory_used() as f64);
        metrics.insert(
            "memory_to_write".to_string(),
            segment.memory_to_write() as f64,
        );
        metrics.insert(
            "memory_available".to_string(),
            config.memory_available as f64,
        );
        metrics.insert(
            "write_buffer_threshold".to_string(),
            config.write_buffer_threshold as f64,
        );
        metrics.insert("resident_objects".to_string(), segment.len() as f64);
        metrics.insert("pending_objects".to_string(), segment.pending_len() as f64);
        if config.memory_available > 0 {
            metrics.insert(
                "memory_utilization".to_string(),
                segment.memory_used() as f64 / config.memory_available as f64,
            );
        }

        metrics
    }

    fn algorithm_name(&self) -> &'static str {
        "MRU"
    }
}

impl<T: Cacheable + ?Sized> fmt::Debug for MruCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MruCache")
            .field("segment", &*self.segment.lock())
            .finish()
    }
}
