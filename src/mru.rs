//! Most Recently Used (MRU) Segment with a Write Buffer
//!
//! This module holds the bookkeeping half of the disk-backed cache: the
//! recency list, the identity index, the write buffer and the two memory
//! counters. It never performs I/O. [`MruCache`](crate::MruCache) wraps it in a
//! mutex and does the `save()`/`load()` calls outside that lock.
//!
//! # Algorithm
//!
//! ```text
//!   loading(x)                 eviction                      flush
//!  ───────────▶ [ x | … | a ] ──────────▶ { pos → a, … } ─────────────▶ save() in
//!               front    back             BTreeMap by (position, id)    position order
//!               memory_used               memory_to_write
//! ```
//!
//! - Registering an object puts it at the front and adds its cost to
//!   `memory_used`.
//! - While `memory_used > memory_available` and more than one object is
//!   resident, the back of the list moves to the write buffer.
//! - Once `memory_to_write >= write_buffer_threshold` the buffer is due for a
//!   flush.
//!
//! # Performance Characteristics
//!
//! - Register / touch / remove of a resident object: O(1) expected
//! - Eviction: O(log n) per evicted object (ordered write buffer insert)
//! - Taking a flush batch: O(n) in the number of buffered objects
//!
//! # Thread Safety
//!
//! Not thread-safe on its own; every method takes `&mut self` or `&self` and
//! the caller provides exclusion.

use crate::cacheable::Cacheable;
use crate::config::MruCacheConfig;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::list::{Handle, List};
use crate::metrics::MruCacheMetrics;
use core::fmt;
use core::mem;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

#[cfg(feature = "hashbrown")]
use hashbrown::{HashMap, HashSet};

#[cfg(not(feature = "hashbrown"))]
use std::collections::{HashMap, HashSet};

/// Write buffer key: file position first so iteration is a forward sweep,
/// identifier second so objects sharing a position coexist.
type WriteKey = (u64, u64);

/// Bookkeeping core shared by [`MruCache`](crate::MruCache).
pub(crate) struct MruSegment<T: ?Sized> {
    config: MruCacheConfig,
    /// Resident objects, most recent at the front.
    list: List<CacheEntry<T>>,
    /// Identifier to recency-list node.
    index: HashMap<u64, Handle>,
    /// Evicted objects waiting to be saved.
    to_write: BTreeMap<WriteKey, CacheEntry<T>>,
    /// Identifier to write buffer position.
    pending: HashMap<u64, u64>,
    /// Identifiers taken out for a flush whose saves have not finished.
    in_flight: HashSet<u64>,
    memory_used: u64,
    memory_to_write: u64,
    metrics: MruCacheMetrics,
}

impl<T: Cacheable + ?Sized> MruSegment<T> {
    pub(crate) fn new(config: MruCacheConfig) -> Self {
        MruSegment {
            config,
            list: List::new(),
            index: HashMap::new(),
            to_write: BTreeMap::new(),
            pending: HashMap::new(),
            in_flight: HashSet::new(),
            memory_used: 0,
            memory_to_write: 0,
            metrics: MruCacheMetrics::new(),
        }
    }

    #[inline]
    pub(crate) fn config(&self) -> MruCacheConfig {
        self.config
    }

    #[inline]
    pub(crate) fn memory_used(&self) -> u64 {
        self.memory_used
    }

    #[inline]
    pub(crate) fn memory_to_write(&self) -> u64 {
        self.memory_to_write
    }

    /// Number of resident objects.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of objects waiting in the write buffer.
    #[inline]
    pub(crate) fn pending_len(&self) -> usize {
        self.to_write.len()
    }

    #[inline]
    pub(crate) fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    #[inline]
    pub(crate) fn is_pending_write(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// True if the object's payload is known to be in memory: resident,
    /// buffered, or currently being saved.
    pub(crate) fn tracks(&self, id: u64) -> bool {
        self.contains(id) || self.is_pending_write(id) || self.in_flight.contains(&id)
    }

    #[inline]
    pub(crate) fn metrics(&self) -> &MruCacheMetrics {
        &self.metrics
    }

    #[inline]
    pub(crate) fn metrics_mut(&mut self) -> &mut MruCacheMetrics {
        &mut self.metrics
    }

    /// Resident identifiers, most recent first.
    pub(crate) fn resident_ids(&self) -> Vec<u64> {
        self.list.iter().map(CacheEntry::id).collect()
    }

    /// Buffered identifiers in the order they will be saved.
    pub(crate) fn pending_ids(&self) -> Vec<u64> {
        self.to_write.keys().map(|&(_, id)| id).collect()
    }

    /// Identifier of the object that would be evicted next.
    pub(crate) fn least_recent(&self) -> Option<u64> {
        self.list.peek_last().map(CacheEntry::id)
    }

    /// Registers `item` as resident, then evicts down to the budget.
    ///
    /// Re-registering the same object promotes it. A buffered object is taken
    /// back out of the write buffer without being saved. A different object
    /// under a tracked identifier is rejected and nothing changes.
    pub(crate) fn loading(&mut self, item: Arc<T>) -> Result<(), CacheError> {
        let id = item.id();

        if let Some(&handle) = self.index.get(&id) {
            let same = self
                .list
                .get(handle)
                .is_some_and(|entry| entry.is_same_object(&item));
            if !same {
                return Err(CacheError::IdentityConflict { id });
            }
            self.metrics.registrations += 1;
            self.promote(handle);
            self.evict_to_budget();
            return Ok(());
        }

        let entry = match self.pending.get(&id).copied() {
            Some(position) => {
                let same = self
                    .to_write
                    .get(&(position, id))
                    .is_some_and(|entry| entry.is_same_object(&item));
                if !same {
                    return Err(CacheError::IdentityConflict { id });
                }
                let Some(mut entry) = self.take_pending(id) else {
                    return Err(CacheError::IdentityConflict { id });
                };
                entry.unpin_position();
                entry.refresh_cost();
                self.metrics.rescued_from_write_buffer += 1;
                trace!(id, "object taken back out of the write buffer");
                entry
            }
            None => CacheEntry::new(item),
        };

        self.metrics.registrations += 1;
        self.memory_used = self.memory_used.saturating_add(entry.cost());
        let handle = self.list.add(entry);
        self.index.insert(id, handle);
        self.evict_to_budget();
        Ok(())
    }

    /// Moves a resident object to the front and applies any cost change.
    ///
    /// Returns `false` if `id` is not resident.
    pub(crate) fn touch(&mut self, id: u64) -> bool {
        let Some(&handle) = self.index.get(&id) else {
            return false;
        };
        self.promote(handle);
        self.evict_to_budget();
        true
    }

    fn promote(&mut self, handle: Handle) {
        self.list.move_to_front(handle);
        if let Some(entry) = self.list.get_mut(handle) {
            let (old, new) = entry.refresh_cost();
            self.memory_used = self.memory_used.saturating_sub(old).saturating_add(new);
            trace!(id = entry.id(), old_cost = old, new_cost = new, "promoted");
        }
        self.metrics.promotions += 1;
    }

    /// Evicts from the back until within budget. The front object is never
    /// evicted, so an over-budget singleton stays resident.
    fn evict_to_budget(&mut self) {
        while self.memory_used > self.config.memory_available && self.list.len() > 1 {
            let Some(entry) = self.list.remove_last() else {
                break;
            };
            self.evict(entry);
        }
    }

    fn evict(&mut self, entry: CacheEntry<T>) {
        self.index.remove(&entry.id());
        self.memory_used = self.memory_used.saturating_sub(entry.cost());
        self.metrics.evictions += 1;
        self.queue_write(entry);
    }

    fn queue_write(&mut self, mut entry: CacheEntry<T>) {
        let position = entry.pin_position();
        self.insert_pending(entry, position);
    }

    fn insert_pending(&mut self, entry: CacheEntry<T>, position: u64) {
        let id = entry.id();
        self.memory_to_write = self.memory_to_write.saturating_add(entry.cost());
        self.pending.insert(id, position);
        debug!(
            id,
            position,
            cost = entry.cost(),
            memory_used = self.memory_used,
            memory_to_write = self.memory_to_write,
            "queued for write"
        );
        self.to_write.insert((position, id), entry);
    }

    fn take_pending(&mut self, id: u64) -> Option<CacheEntry<T>> {
        let position = self.pending.remove(&id)?;
        let entry = self.to_write.remove(&(position, id))?;
        self.memory_to_write = self.memory_to_write.saturating_sub(entry.cost());
        Some(entry)
    }

    /// Moves every resident object into the write buffer, oldest first.
    pub(crate) fn evict_all(&mut self) {
        while let Some(entry) = self.list.remove_last() {
            self.evict(entry);
        }
    }

    /// True when the buffer holds something and has reached the threshold.
    pub(crate) fn flush_due(&self) -> bool {
        !self.to_write.is_empty() && self.memory_to_write >= self.config.write_buffer_threshold
    }

    /// Empties the write buffer and returns its entries in file-position order.
    ///
    /// The batch's cost leaves `memory_to_write` now; failed saves put it back
    /// through [`finish_flush`](Self::finish_flush).
    pub(crate) fn take_write_batch(&mut self) -> Vec<CacheEntry<T>> {
        let batch = mem::take(&mut self.to_write);
        self.pending.clear();
        self.memory_to_write = 0;
        self.in_flight.extend(batch.values().map(CacheEntry::id));
        batch.into_values().collect()
    }

    /// Records a finished flush and re-buffers the objects that failed.
    ///
    /// A failed object is dropped instead if, while it was being saved, it was
    /// registered again, buffered again, or removed.
    pub(crate) fn finish_flush(&mut self, failed: Vec<CacheEntry<T>>, saved: u64, cost_saved: u64) {
        let failed_count = failed.len() as u64;
        for entry in failed {
            let id = entry.id();
            let still_ours = self.in_flight.contains(&id);
            if !still_ours || self.contains(id) || self.is_pending_write(id) {
                trace!(id, "dropping failed write superseded during flush");
                continue;
            }
            let position = match entry.position() {
                Some(position) => position,
                None => entry.item().file_position(),
            };
            self.insert_pending(entry, position);
        }
        self.in_flight.clear();
        self.metrics.record_flush(saved, cost_saved, failed_count);
    }

    /// Stops tracking `id` without saving it.
    ///
    /// Returns the object if it was resident or buffered.
    pub(crate) fn remove(&mut self, id: u64) -> Option<Arc<T>> {
        // A save of this object may be in flight even if it was registered
        // again since; its failure must not be re-buffered.
        self.in_flight.remove(&id);
        if let Some(handle) = self.index.remove(&id) {
            let entry = self.list.remove(handle)?;
            self.memory_used = self.memory_used.saturating_sub(entry.cost());
            return Some(entry.into_item());
        }
        self.take_pending(id).map(CacheEntry::into_item)
    }

    /// Checks every structural invariant. Test builds only.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.index.len(), self.list.len());
        for (&id, &handle) in &self.index {
            let entry = self.list.get(handle).expect("index points at a live node");
            assert_eq!(entry.id(), id);
        }
        let resident_cost: u64 = self.list.iter().map(CacheEntry::cost).sum();
        assert_eq!(resident_cost, self.memory_used);

        assert_eq!(self.pending.len(), self.to_write.len());
        for (&(position, id), entry) in &self.to_write {
            assert_eq!(entry.id(), id);
            assert_eq!(entry.position(), Some(position));
            assert_eq!(self.pending.get(&id), Some(&position));
            assert!(!self.index.contains_key(&id), "id {} is doubly resident", id);
        }
        let pending_cost: u64 = self.to_write.values().map(CacheEntry::cost).sum();
        assert_eq!(pending_cost, self.memory_to_write);
    }
}

impl<T: ?Sized> fmt::Debug for MruSegment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MruSegment")
            .field("config", &self.config)
            .field("resident", &self.list.len())
            .field("pending", &self.to_write.len())
            .field("memory_used", &self.memory_used)
            .field("memory_to_write", &self.memory_to_write)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cacheable::PersistError;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Obj {
        id: u64,
        cost: AtomicU64,
        position: u64,
    }

    impl Cacheable for Obj {
        fn id(&self) -> u64 {
            self.id
        }
        fn memory_size(&self) -> u64 {
            self.cost.load(Ordering::Relaxed)
        }
        fn file_position(&self) -> u64 {
            self.position
        }
        fn save(&self) -> Result<(), PersistError> {
            Ok(())
        }
        fn load(&self) -> Result<(), PersistError> {
            Ok(())
        }
    }

    fn obj(id: u64, cost: u64, position: u64) -> Arc<Obj> {
        Arc::new(Obj {
            id,
            cost: AtomicU64::new(cost),
            position,
        })
    }

    fn segment(memory_available: u64, write_buffer_threshold: u64) -> MruSegment<Obj> {
        MruSegment::new(MruCacheConfig {
            memory_available,
            write_buffer_threshold,
        })
    }

    #[test]
    fn test_loading_evicts_oldest() {
        let mut seg = segment(100, 50);
        for id in 1..=3 {
            seg.loading(obj(id, 40, id * 1000)).unwrap();
            seg.assert_consistent();
        }
        assert_eq!(seg.resident_ids(), vec![3, 2]);
        assert_eq!(seg.pending_ids(), vec![1]);
        assert_eq!(seg.memory_used(), 80);
        assert_eq!(seg.memory_to_write(), 40);
        assert!(!seg.flush_due());

        seg.loading(obj(4, 40, 4000)).unwrap();
        seg.assert_consistent();
        assert_eq!(seg.pending_ids(), vec![1, 2]);
        assert_eq!(seg.memory_to_write(), 80);
        assert!(seg.flush_due());
    }

    #[test]
    fn test_same_object_reregistration_promotes() {
        let mut seg = segment(100, 1000);
        let a = obj(1, 40, 0);
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(2, 40, 0)).unwrap();
        seg.loading(Arc::clone(&a)).unwrap();
        assert_eq!(seg.resident_ids(), vec![1, 2]);
        assert_eq!(seg.memory_used(), 80);
        assert_eq!(seg.metrics().promotions, 1);

        // 2 is now the oldest
        seg.loading(obj(3, 40, 0)).unwrap();
        assert_eq!(seg.pending_ids(), vec![2]);
        seg.assert_consistent();
    }

    #[test]
    fn test_identity_conflict_leaves_state_unchanged() {
        let mut seg = segment(100, 1000);
        seg.loading(obj(1, 40, 0)).unwrap();
        let err = seg.loading(obj(1, 10, 0)).unwrap_err();
        assert!(matches!(err, CacheError::IdentityConflict { id: 1 }));
        assert_eq!(seg.memory_used(), 40);
        assert_eq!(seg.len(), 1);
        seg.assert_consistent();
    }

    #[test]
    fn test_identity_conflict_with_buffered_object() {
        let mut seg = segment(10, 1000);
        seg.loading(obj(1, 10, 0)).unwrap();
        seg.loading(obj(2, 10, 0)).unwrap();
        assert!(seg.is_pending_write(1));
        let err = seg.loading(obj(1, 10, 0)).unwrap_err();
        assert!(matches!(err, CacheError::IdentityConflict { id: 1 }));
        assert!(seg.is_pending_write(1));
        seg.assert_consistent();
    }

    #[test]
    fn test_reloading_buffered_object_rescues_it() {
        let mut seg = segment(80, 1000);
        let a = obj(1, 40, 100);
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(2, 40, 200)).unwrap();
        seg.loading(obj(3, 40, 300)).unwrap();
        assert_eq!(seg.pending_ids(), vec![1]);

        seg.loading(Arc::clone(&a)).unwrap();
        assert!(seg.contains(1));
        assert!(!seg.is_pending_write(1));
        // 2 went out to make room
        assert_eq!(seg.pending_ids(), vec![2]);
        assert_eq!(seg.metrics().rescued_from_write_buffer, 1);
        seg.assert_consistent();
    }

    #[test]
    fn test_zero_cost_never_evicts() {
        let mut seg = segment(100, 50);
        seg.loading(obj(1, 60, 0)).unwrap();
        seg.loading(obj(2, 0, 0)).unwrap();
        seg.loading(obj(3, 0, 0)).unwrap();
        assert_eq!(seg.memory_used(), 60);
        assert_eq!(seg.pending_len(), 0);
    }

    #[test]
    fn test_over_budget_singleton_stays() {
        let mut seg = segment(0, 1000);
        seg.loading(obj(1, 500, 0)).unwrap();
        assert_eq!(seg.resident_ids(), vec![1]);
        assert_eq!(seg.memory_used(), 500);

        seg.loading(obj(2, 10, 0)).unwrap();
        assert_eq!(seg.resident_ids(), vec![2]);
        assert_eq!(seg.pending_ids(), vec![1]);
        seg.assert_consistent();
    }

    #[test]
    fn test_touch_applies_cost_delta_and_evicts() {
        let mut seg = segment(100, 1000);
        let a = obj(1, 30, 0);
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(2, 30, 0)).unwrap();
        seg.loading(obj(3, 30, 0)).unwrap();

        assert!(seg.touch(1));
        assert_eq!(seg.memory_used(), 90);
        assert_eq!(seg.resident_ids(), vec![1, 3, 2]);

        a.cost.store(50, Ordering::Relaxed);
        assert!(seg.touch(1));
        // 110 > 100, so the oldest (2) is evicted
        assert_eq!(seg.memory_used(), 80);
        assert_eq!(seg.pending_ids(), vec![2]);
        seg.assert_consistent();

        assert!(!seg.touch(2));
        assert!(!seg.touch(99));
    }

    #[test]
    fn test_write_batch_is_position_ordered() {
        let mut seg = segment(0, u64::MAX);
        let positions = [(1, 900), (2, 100), (3, 500), (4, 100), (5, 0)];
        for &(id, position) in &positions {
            seg.loading(obj(id, 1, position)).unwrap();
        }
        // 5 is still resident
        assert_eq!(seg.pending_ids(), vec![2, 4, 3, 1]);

        let batch = seg.take_write_batch();
        let order: Vec<u64> = batch.iter().map(CacheEntry::id).collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
        assert_eq!(seg.memory_to_write(), 0);
        assert_eq!(seg.pending_len(), 0);
        assert!(seg.tracks(3));

        seg.finish_flush(Vec::new(), 4, 4);
        assert!(!seg.tracks(3));
        seg.assert_consistent();
    }

    #[test]
    fn test_finish_flush_rebuffers_failures() {
        let mut seg = segment(0, u64::MAX);
        seg.loading(obj(1, 10, 100)).unwrap();
        seg.loading(obj(2, 20, 200)).unwrap();
        seg.loading(obj(3, 30, 300)).unwrap();

        let mut batch = seg.take_write_batch();
        let failed = batch.pop().unwrap();
        assert_eq!(failed.id(), 2);
        seg.finish_flush(vec![failed], 1, 10);

        assert_eq!(seg.pending_ids(), vec![2]);
        assert_eq!(seg.memory_to_write(), 20);
        assert_eq!(seg.metrics().save_failures, 1);
        assert_eq!(seg.metrics().objects_saved, 1);
        seg.assert_consistent();
    }

    #[test]
    fn test_finish_flush_skips_superseded_failures() {
        let mut seg = segment(0, u64::MAX);
        let a = obj(1, 10, 100);
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(2, 20, 200)).unwrap();
        seg.loading(obj(3, 30, 300)).unwrap();

        let batch = seg.take_write_batch();
        // 1 comes back into memory while the flush is running, 2 is deleted
        seg.loading(Arc::clone(&a)).unwrap();
        assert!(seg.remove(2).is_none());

        seg.finish_flush(batch, 0, 0);
        assert!(seg.contains(1));
        assert!(!seg.is_pending_write(1));
        assert!(!seg.is_pending_write(2));
        seg.assert_consistent();
    }

    #[test]
    fn test_remove_after_reregistration_during_flush_discards_failure() {
        let mut seg = segment(0, u64::MAX);
        let a = obj(1, 10, 100);
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(2, 20, 200)).unwrap();

        let batch = seg.take_write_batch();
        assert_eq!(batch.iter().map(CacheEntry::id).collect::<Vec<_>>(), vec![1]);
        // Back in memory mid-flush, then destroyed by its owner
        seg.loading(Arc::clone(&a)).unwrap();
        assert_eq!(seg.remove(1).map(|o| o.id()), Some(1));
        assert!(!seg.tracks(1));

        // Its save failed; the destroyed object must not come back
        seg.finish_flush(batch, 0, 0);
        assert_eq!(seg.pending_ids(), vec![2]);
        assert_eq!(seg.memory_to_write(), 20);
        assert!(!seg.tracks(1));
        seg.assert_consistent();
    }

    #[test]
    fn test_remove_of_rebuffered_object_during_flush_discards_failure() {
        let mut seg = segment(0, u64::MAX);
        let a = obj(1, 10, 100);
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(2, 20, 200)).unwrap();

        let batch = seg.take_write_batch();
        // Re-registered, then evicted into the buffer again, then removed
        seg.loading(Arc::clone(&a)).unwrap();
        seg.loading(obj(3, 30, 300)).unwrap();
        assert_eq!(seg.pending_ids(), vec![1, 2]);
        assert_eq!(seg.remove(1).map(|o| o.id()), Some(1));

        seg.finish_flush(batch, 0, 0);
        assert_eq!(seg.pending_ids(), vec![2]);
        assert_eq!(seg.memory_to_write(), 20);
        seg.assert_consistent();
    }

    #[test]
    fn test_cost_totals_saturate_instead_of_overflowing() {
        let mut seg = segment(u64::MAX, u64::MAX);
        seg.loading(obj(1, u64::MAX, 0)).unwrap();
        seg.loading(obj(2, 10, 0)).unwrap();
        assert_eq!(seg.memory_used(), u64::MAX);
        assert_eq!(seg.len(), 2);

        assert!(seg.remove(2).is_some());
        assert!(seg.remove(1).is_some());
        assert_eq!(seg.memory_used(), 0);
        assert!(seg.is_empty());
    }

    #[test]
    fn test_remove_adjusts_counters() {
        let mut seg = segment(50, 1000);
        seg.loading(obj(1, 30, 0)).unwrap();
        seg.loading(obj(2, 30, 0)).unwrap();
        assert!(seg.is_pending_write(1));

        assert_eq!(seg.remove(1).map(|o| o.id()), Some(1));
        assert_eq!(seg.memory_to_write(), 0);
        assert_eq!(seg.remove(2).map(|o| o.id()), Some(2));
        assert_eq!(seg.memory_used(), 0);
        assert!(seg.remove(3).is_none());
        assert!(seg.is_empty());
        seg.assert_consistent();
    }

    #[test]
    fn test_evict_all_moves_everything_oldest_first() {
        let mut seg = segment(1000, 1000);
        for id in 1..=4 {
            seg.loading(obj(id, 5, 0)).unwrap();
        }
        assert_eq!(seg.least_recent(), Some(1));
        seg.evict_all();
        assert!(seg.is_empty());
        assert_eq!(seg.memory_used(), 0);
        assert_eq!(seg.memory_to_write(), 20);
        // Same position everywhere, so ties fall back to id order
        assert_eq!(seg.pending_ids(), vec![1, 2, 3, 4]);
        assert!(seg.least_recent().is_none());
        seg.assert_consistent();
    }
}
