use crate::expiry::NEVER;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A container for a value in the cache, holding all per-entry metadata.
///
/// An entry is owned exclusively by the store slot that contains it; replacing
/// the value produces a successor entry with a bumped version.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<V>,
  /// Creation timestamp in nanoseconds since the cache epoch.
  creation_time: u64,
  /// The absolute expiration timestamp in nanoseconds. `NEVER` disables expiry.
  expires_at: AtomicU64,
  /// The last access timestamp in nanoseconds.
  last_access: AtomicU64,
  /// The number of reads served by this entry. Feeds the sampled LFU policy.
  access_count: AtomicU64,
  /// Monotonic version, incremented whenever the content changes.
  version: u64,
}

impl<V> CacheEntry<V> {
  /// Creates a fresh entry for a newly installed value.
  pub(crate) fn new(value: V, now: u64, expires_at: u64) -> Self {
    Self {
      value: Arc::new(value),
      creation_time: now,
      expires_at: AtomicU64::new(expires_at),
      last_access: AtomicU64::new(now),
      access_count: AtomicU64::new(0),
      version: 1,
    }
  }

  /// Builds the successor entry for an in-place value replacement.
  /// Creation time and the access counter carry over; the version is bumped.
  pub(crate) fn replaced_with(&self, value: V, now: u64, expires_at: u64) -> Self {
    Self {
      value: Arc::new(value),
      creation_time: self.creation_time,
      expires_at: AtomicU64::new(expires_at),
      last_access: AtomicU64::new(now),
      access_count: AtomicU64::new(self.access_count.load(Ordering::Relaxed)),
      version: self.version + 1,
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn version(&self) -> u64 {
    self.version
  }

  #[inline]
  pub(crate) fn creation_time(&self) -> u64 {
    self.creation_time
  }

  #[inline]
  pub(crate) fn last_access(&self) -> u64 {
    self.last_access.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn access_count(&self) -> u64 {
    self.access_count.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn expires_at(&self) -> u64 {
    self.expires_at.load(Ordering::Relaxed)
  }

  /// Checks if the entry is expired at the given instant.
  #[inline]
  pub(crate) fn is_expired_at(&self, now: u64) -> bool {
    let expires_at = self.expires_at.load(Ordering::Relaxed);
    expires_at != NEVER && expires_at <= now
  }

  /// Records a read: bumps the access counter, refreshes the access
  /// timestamp, and installs a new expiry when the policy slid the window.
  #[inline]
  pub(crate) fn record_access(&self, now: u64, new_expiry: Option<u64>) {
    self.last_access.store(now, Ordering::Relaxed);
    self.access_count.fetch_add(1, Ordering::Relaxed);
    if let Some(expiry) = new_expiry {
      self.expires_at.store(expiry, Ordering::Relaxed);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::CacheEntry;
  use crate::expiry::NEVER;

  #[test]
  fn replacement_bumps_version_and_keeps_creation_time() {
    let first = CacheEntry::new("a", 10, NEVER);
    let second = first.replaced_with("b", 20, NEVER);
    assert_eq!(second.version(), 2);
    assert_eq!(second.creation_time(), 10);
    assert_eq!(*second.value(), "b");
  }

  #[test]
  fn expiry_boundary_is_inclusive() {
    let entry = CacheEntry::new((), 0, 100);
    assert!(!entry.is_expired_at(99));
    assert!(entry.is_expired_at(100));
    assert!(entry.is_expired_at(101));
  }

  #[test]
  fn never_means_never() {
    let entry = CacheEntry::new((), 0, NEVER);
    assert!(!entry.is_expired_at(u64::MAX - 1));
  }
}
