//! Error types returned by the cache.
//!
//! Contract violations fail the call that made them and leave the cache
//! untouched. Persistence failures never abort a flush: every object in the
//! batch gets its `save()` attempt, failed objects stay buffered, and the
//! caller receives one [`FlushError`] naming all of them.

use crate::cacheable::PersistError;
use thiserror::Error;

/// Errors returned by [`MruCache`](crate::MruCache) operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A different object was registered under an identifier the cache is
    /// already tracking.
    #[error("object id {id} is already tracked by a different object")]
    IdentityConflict {
        /// The contested identifier.
        id: u64,
    },

    /// `load()` failed while bringing an object back into memory.
    #[error("failed to load object {id}")]
    Load {
        /// Identifier of the object that failed to load.
        id: u64,
        /// The underlying failure.
        #[source]
        source: PersistError,
    },

    /// A flush triggered by this call could not save every object.
    ///
    /// The operation that triggered the flush has already taken effect.
    #[error(transparent)]
    Flush(#[from] FlushError),
}

/// One object that could not be saved during a flush.
#[derive(Debug, Error)]
#[error("object {id} at file position {position}: {source}")]
pub struct FlushFailure {
    /// Identifier of the object.
    pub id: u64,
    /// File position it was queued under.
    pub position: u64,
    /// The failure returned by `save()`.
    #[source]
    pub source: PersistError,
}

/// Aggregate result of a flush in which at least one `save()` failed.
#[derive(Debug, Error)]
#[error("{} of {} buffered objects failed to save", .failures.len(), .saved + .failures.len())]
pub struct FlushError {
    /// Number of objects that were saved successfully.
    pub saved: usize,
    /// Every object that failed, in file-position order.
    pub failures: Vec<FlushFailure>,
}

impl FlushError {
    /// Identifiers of the objects that failed to save.
    pub fn failed_ids(&self) -> Vec<u64> {
        self.failures.iter().map(|f| f.id).collect()
    }
}
