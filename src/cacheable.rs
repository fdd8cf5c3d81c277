//! The Cacheable Capability Contract
//!
//! [`MruCache`](crate::MruCache) never touches an object's payload. It only
//! needs to know who an object is, how much of the budget it occupies, where
//! it lives in the backing file, and how to ask it to save or reload itself.
//! Those five questions make up the [`Cacheable`] trait.
//!
//! # Sharing
//!
//! Objects are handed to the cache as `Arc<T>` and stay shared with their
//! owner (typically a larger workspace) and any worker thread that is using
//! them. Every method therefore takes `&self`; implementations keep their
//! payload behind interior mutability (`Mutex`, `RwLock`, atomics).
//!
//! # Example
//!
//! ```
//! use disk_mru::{Cacheable, PersistError};
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! struct Block {
//!     id: u64,
//!     offset: u64,
//!     len: u64,
//!     dirty: AtomicBool,
//! }
//!
//! impl Cacheable for Block {
//!     fn id(&self) -> u64 {
//!         self.id
//!     }
//!
//!     fn memory_size(&self) -> u64 {
//!         self.len
//!     }
//!
//!     fn file_position(&self) -> u64 {
//!         self.offset
//!     }
//!
//!     fn save(&self) -> Result<(), PersistError> {
//!         // Nothing to write when clean
//!         self.dirty.store(false, Ordering::Release);
//!         Ok(())
//!     }
//!
//!     fn load(&self) -> Result<(), PersistError> {
//!         Ok(())
//!     }
//! }
//! ```

use thiserror::Error;

/// Failure reported by a [`Cacheable::save`] or [`Cacheable::load`] hook.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The backing store returned an I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Data read back from the store did not decode.
    #[error("corrupt data at file position {position}: {reason}")]
    Corrupt {
        /// Position the object was read from.
        position: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Any other implementation-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Operations an object must expose to be managed by an
/// [`MruCache`](crate::MruCache).
///
/// The cache calls [`id`](Cacheable::id) once when an object is registered
/// and keys its indexes on the result, so the identifier must stay fixed while
/// the object is tracked. [`memory_size`](Cacheable::memory_size) is queried on
/// every registration and promotion; the value may change between calls.
/// [`file_position`](Cacheable::file_position) is read when the object is
/// evicted into the write buffer and only decides write order.
pub trait Cacheable: Send + Sync {
    /// Unique, stable identifier of this object within one cache.
    fn id(&self) -> u64;

    /// Current approximate in-memory cost, in the cache's cost unit.
    ///
    /// The cache's running totals saturate at `u64::MAX`. Sums beyond that
    /// are not meaningful, so pick a unit that keeps the whole working set
    /// well below it.
    fn memory_size(&self) -> u64;

    /// Location of this object in the backing store.
    fn file_position(&self) -> u64;

    /// Writes the current contents to the backing store.
    ///
    /// Must be a harmless no-op when there is nothing unsaved.
    fn save(&self) -> Result<(), PersistError>;

    /// Repopulates the in-memory contents from the backing store.
    fn load(&self) -> Result<(), PersistError>;
}
