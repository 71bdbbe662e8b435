//! Read-through and write-through collaborator traits.
//!
//! The cache calls both outside of any internal lock; implementations may
//! block on I/O. Loader failures surface as [`CacheError::Loader`] and leave
//! no partial state; writer failures surface as [`CacheError::Writer`] after
//! the in-memory mutation has already committed.
//!
//! [`CacheError::Loader`]: crate::error::CacheError::Loader
//! [`CacheError::Writer`]: crate::error::CacheError::Writer

use crate::error::DynError;

/// Populates the cache on read misses.
pub trait CacheLoader<K, V>: Send + Sync {
  /// Returns the value for `key`, or `Ok(None)` when the backing source has
  /// no value for it.
  fn load(&self, key: &K) -> Result<Option<V>, DynError>;
}

/// Persists committed mutations to an external store.
pub trait CacheWriter<K, V>: Send + Sync {
  /// Called after a value was installed or replaced.
  fn write(&self, key: &K, value: &V) -> Result<(), DynError>;

  /// Called after an entry was removed.
  fn delete(&self, key: &K) -> Result<(), DynError>;
}

/// A [`CacheLoader`] backed by a closure.
pub struct FnLoader<F>(pub F);

impl<K, V, F> CacheLoader<K, V> for FnLoader<F>
where
  F: Fn(&K) -> Result<Option<V>, DynError> + Send + Sync,
{
  fn load(&self, key: &K) -> Result<Option<V>, DynError> {
    (self.0)(key)
  }
}
