//! Expiration policies.
//!
//! A policy computes absolute expiry timestamps (nanoseconds since the cache
//! epoch) from three hooks, consulted on entry creation, read access, and
//! value update. Returning [`NEVER`] from the creation hook disables expiry;
//! returning `None` from the access/update hooks leaves the current expiry
//! untouched.

use std::time::Duration;

/// Sentinel expiry timestamp meaning "never expires".
pub const NEVER: u64 = u64::MAX;

fn saturating_deadline(now: u64, ttl: Duration) -> u64 {
  // A deadline that overflows the clock is indistinguishable from "never".
  match now.checked_add(ttl.as_nanos() as u64) {
    Some(deadline) if deadline != NEVER => deadline,
    _ => NEVER - 1,
  }
}

/// Computes per-entry expiration deadlines.
///
/// Implementations must be cheap: the hooks run inside the store's per-key
/// section or on the read fast path.
pub trait ExpiryPolicy: Send + Sync {
  /// The absolute expiry for a newly created entry.
  fn expiry_for_creation(&self, now: u64) -> u64;

  /// A new absolute expiry after a read access, or `None` to keep the
  /// current one.
  fn expiry_for_access(&self, now: u64, current: u64) -> Option<u64>;

  /// A new absolute expiry after a value update, or `None` to keep the
  /// current one.
  fn expiry_for_update(&self, now: u64, current: u64) -> Option<u64>;

  /// True when this policy can never expire an entry. A cache whose policy
  /// is eternal and whose capacity is unbounded does not run an evictor.
  fn is_eternal(&self) -> bool {
    false
  }
}

/// Entries never expire.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eternal;

impl ExpiryPolicy for Eternal {
  fn expiry_for_creation(&self, _now: u64) -> u64 {
    NEVER
  }

  fn expiry_for_access(&self, _now: u64, _current: u64) -> Option<u64> {
    None
  }

  fn expiry_for_update(&self, _now: u64, _current: u64) -> Option<u64> {
    None
  }

  fn is_eternal(&self) -> bool {
    true
  }
}

/// Entries expire a fixed duration after creation. Reads and updates do not
/// extend the deadline.
#[derive(Debug, Clone, Copy)]
pub struct CreatedExpiry {
  ttl: Duration,
}

impl CreatedExpiry {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl }
  }
}

impl ExpiryPolicy for CreatedExpiry {
  fn expiry_for_creation(&self, now: u64) -> u64 {
    saturating_deadline(now, self.ttl)
  }

  fn expiry_for_access(&self, _now: u64, _current: u64) -> Option<u64> {
    None
  }

  fn expiry_for_update(&self, _now: u64, _current: u64) -> Option<u64> {
    None
  }
}

/// Entries expire a fixed duration after creation or the most recent value
/// update. Reads do not extend the deadline.
#[derive(Debug, Clone, Copy)]
pub struct ModifiedExpiry {
  ttl: Duration,
}

impl ModifiedExpiry {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl }
  }
}

impl ExpiryPolicy for ModifiedExpiry {
  fn expiry_for_creation(&self, now: u64) -> u64 {
    saturating_deadline(now, self.ttl)
  }

  fn expiry_for_access(&self, _now: u64, _current: u64) -> Option<u64> {
    None
  }

  fn expiry_for_update(&self, now: u64, _current: u64) -> Option<u64> {
    Some(saturating_deadline(now, self.ttl))
  }
}

/// Entries expire a fixed duration after the most recent touch of any kind:
/// creation, read access, or value update.
#[derive(Debug, Clone, Copy)]
pub struct TouchedExpiry {
  ttl: Duration,
}

impl TouchedExpiry {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl }
  }
}

impl ExpiryPolicy for TouchedExpiry {
  fn expiry_for_creation(&self, now: u64) -> u64 {
    saturating_deadline(now, self.ttl)
  }

  fn expiry_for_access(&self, now: u64, _current: u64) -> Option<u64> {
    Some(saturating_deadline(now, self.ttl))
  }

  fn expiry_for_update(&self, now: u64, _current: u64) -> Option<u64> {
    Some(saturating_deadline(now, self.ttl))
  }
}
