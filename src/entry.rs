//! Cache Entry Type
//!
//! A [`CacheEntry`] is the cache's view of one managed object: a shared
//! handle to the object plus the bookkeeping the cache needs to keep its
//! counters honest without asking the object again.
//!
//! # Captured Values
//!
//! - `id`: read once at registration. The indexes are keyed on it, so it is
//!   never re-queried.
//! - `cost`: the `memory_size()` reported at the last touch. Counters are
//!   adjusted by the difference between this and the fresh value, which keeps
//!   `memory_used` equal to the sum of captured costs.
//! - `position`: the `file_position()` read when the entry was evicted into
//!   the write buffer. `None` while resident.

use crate::cacheable::Cacheable;
use core::fmt;
use std::sync::Arc;

/// One tracked object and its cache-side bookkeeping.
pub(crate) struct CacheEntry<T: ?Sized> {
    item: Arc<T>,
    id: u64,
    cost: u64,
    position: Option<u64>,
}

impl<T: Cacheable + ?Sized> CacheEntry<T> {
    /// Wraps `item`, capturing its identifier and current cost.
    pub(crate) fn new(item: Arc<T>) -> Self {
        let id = item.id();
        let cost = item.memory_size();
        CacheEntry {
            item,
            id,
            cost,
            position: None,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Cost captured at the last touch.
    #[inline]
    pub(crate) fn cost(&self) -> u64 {
        self.cost
    }

    /// File position captured at eviction, if evicted.
    #[inline]
    pub(crate) fn position(&self) -> Option<u64> {
        self.position
    }

    #[inline]
    pub(crate) fn item(&self) -> &Arc<T> {
        &self.item
    }

    pub(crate) fn into_item(self) -> Arc<T> {
        self.item
    }

    /// Re-queries the object's cost and returns `(old, new)`.
    pub(crate) fn refresh_cost(&mut self) -> (u64, u64) {
        let old = self.cost;
        self.cost = self.item.memory_size();
        (old, self.cost)
    }

    /// Reads the object's file position and records it for the write buffer.
    pub(crate) fn pin_position(&mut self) -> u64 {
        let position = self.item.file_position();
        self.position = Some(position);
        position
    }

    /// Forgets the write-buffer position when the entry becomes resident again.
    pub(crate) fn unpin_position(&mut self) {
        self.position = None;
    }

    /// Returns true if `other` is the same allocation as the tracked object.
    pub(crate) fn is_same_object(&self, other: &Arc<T>) -> bool {
        // Compare data pointers only; vtable pointers of `dyn` handles are
        // not guaranteed unique.
        Arc::as_ptr(&self.item).cast::<()>() == Arc::as_ptr(other).cast::<()>()
    }
}

impl<T: ?Sized> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("cost", &self.cost)
            .field("position", &self.position)
            .finish()
    }
}
