use crate::entry::CacheEntry;
use crate::time;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// Tagged outcome of a compose-and-classify step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeStatus {
  /// The key was absent and is now present.
  Created,
  /// The key was present and its value was replaced.
  Changed,
  /// No mutation happened.
  Unchanged,
  /// No mutation happened because an expected-value check failed.
  CasFailedEquals,
  /// The key was present and is now absent.
  Removed,
}

/// The verdict a mutator hands back after inspecting the current entry.
pub(crate) enum Mutation<V> {
  /// Leave the slot untouched.
  Keep,
  /// Leave the slot untouched; an expected-value check failed.
  KeepCasFailed,
  /// Install a value into an empty slot, expiring at the given instant.
  Insert(V, u64),
  /// Replace the current value, expiring at the given instant.
  Replace(V, u64),
  /// Drop the current entry.
  Remove,
}

/// The result of one compose-and-classify step. The status and both values
/// were captured while the per-key section was held, so later pipeline
/// stages observe a stable result.
pub(crate) struct ComposeOutcome<V> {
  pub(crate) status: ChangeStatus,
  pub(crate) old_value: Option<Arc<V>>,
  pub(crate) new_value: Option<Arc<V>>,
  /// Value of an entry that was found expired and dropped by this step,
  /// before the mutator ran. The caller owes an expiry notification for it.
  pub(crate) expired_old: Option<Arc<V>>,
}

/// The result of a read against the store.
pub(crate) enum ReadOutcome<V> {
  Hit(Arc<V>),
  Miss {
    /// Present when the read itself retired an expired entry.
    expired_old: Option<Arc<V>>,
  },
}

/// A single, independently locked partition of the cache.
pub(crate) struct Shard<K, V, H> {
  pub(crate) map: RwLock<HashMap<K, CacheEntry<V>, H>>,
}

/// A cache store partitioned into multiple, independently locked shards.
///
/// The shard write lock is the per-key exclusive section: between reading
/// the current state and installing a mutator's result, no other mutator
/// can observe an intermediate state for any key of that shard.
pub(crate) struct ShardedStore<K, V, H> {
  pub(crate) shards: Box<[CachePadded<Shard<K, V, H>>]>,
  pub(crate) hasher: H,
  len: CachePadded<AtomicUsize>,
}

impl<K, V, H> fmt::Debug for ShardedStore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .field("len", &self.len.load(Ordering::Relaxed))
      .finish()
  }
}

impl<K, V, H> ShardedStore<K, V, H> {
  /// The number of live entries across all shards. Entries that have
  /// expired but were not yet retired are still counted.
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.len.load(Ordering::Relaxed)
  }
}

impl<K, V, H> ShardedStore<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a new store with the specified number of shards and hasher.
  /// The shard count must be a power of two.
  pub(crate) fn new(num_shards: usize, hasher: H) -> Self {
    debug_assert!(num_shards.is_power_of_two());
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      shards.push(CachePadded::new(Shard {
        map: RwLock::new(HashMap::with_hasher(hasher.clone())),
      }));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      len: CachePadded::new(AtomicUsize::new(0)),
    }
  }

  /// Returns a reference to the `Shard` for a given key.
  #[inline]
  pub(crate) fn shard_for(&self, key: &K) -> &Shard<K, V, H> {
    let hash = hash_key(&self.hasher, key);
    let index = hash as usize & (self.shards.len() - 1);
    &self.shards[index]
  }

  /// Executes `mutator` under the key's exclusive section and classifies the
  /// result.
  ///
  /// If the slot holds an expired entry, it is retired first and the mutator
  /// observes an absent key; the dropped value is reported in `expired_old`.
  /// The mutator receives the current clock reading so expiry deadlines and
  /// the expiry check agree on "now".
  pub(crate) fn compose_and_classify<F>(&self, key: &K, mutator: F) -> ComposeOutcome<V>
  where
    K: Clone,
    F: FnOnce(u64, Option<&CacheEntry<V>>) -> Mutation<V>,
  {
    let now = time::now_nanos();
    let shard = self.shard_for(key);
    let mut guard = shard.map.write();

    let mut expired_old = None;
    if let Some(entry) = guard.get(key) {
      if entry.is_expired_at(now) {
        if let Some(entry) = guard.remove(key) {
          expired_old = Some(entry.value());
          self.len.fetch_sub(1, Ordering::Relaxed);
        }
      }
    }

    let decision;
    let old_value;
    {
      let current = guard.get(key);
      old_value = current.map(|entry| entry.value());
      decision = mutator(now, current);
    }

    match decision {
      Mutation::Keep => ComposeOutcome {
        status: ChangeStatus::Unchanged,
        old_value,
        new_value: None,
        expired_old,
      },
      Mutation::KeepCasFailed => ComposeOutcome {
        status: ChangeStatus::CasFailedEquals,
        old_value,
        new_value: None,
        expired_old,
      },
      Mutation::Insert(value, expires_at) => {
        debug_assert!(old_value.is_none(), "insert into an occupied slot");
        let entry = CacheEntry::new(value, now, expires_at);
        let new_value = Some(entry.value());
        guard.insert(key.clone(), entry);
        self.len.fetch_add(1, Ordering::Relaxed);
        ComposeOutcome {
          status: ChangeStatus::Created,
          old_value: None,
          new_value,
          expired_old,
        }
      }
      Mutation::Replace(value, expires_at) => match guard.get(key) {
        Some(prev) => {
          let next = prev.replaced_with(value, now, expires_at);
          let new_value = Some(next.value());
          guard.insert(key.clone(), next);
          ComposeOutcome {
            status: ChangeStatus::Changed,
            old_value,
            new_value,
            expired_old,
          }
        }
        None => ComposeOutcome {
          status: ChangeStatus::Unchanged,
          old_value: None,
          new_value: None,
          expired_old,
        },
      },
      Mutation::Remove => match guard.remove(key) {
        Some(entry) => {
          self.len.fetch_sub(1, Ordering::Relaxed);
          ComposeOutcome {
            status: ChangeStatus::Removed,
            old_value: Some(entry.value()),
            new_value: None,
            expired_old,
          }
        }
        None => ComposeOutcome {
          status: ChangeStatus::Unchanged,
          old_value: None,
          new_value: None,
          expired_old,
        },
      },
    }
  }

  /// Reads a key, recording the access and applying a sliding expiry from
  /// `access_expiry` on a hit. An entry observed expired is retired under
  /// the shard write lock and reported as a miss.
  pub(crate) fn read<F>(&self, key: &K, access_expiry: F) -> ReadOutcome<V>
  where
    F: Fn(u64, u64) -> Option<u64>,
  {
    let now = time::now_nanos();
    let shard = self.shard_for(key);

    {
      let guard = shard.map.read();
      match guard.get(key) {
        Some(entry) if !entry.is_expired_at(now) => {
          entry.record_access(now, access_expiry(now, entry.expires_at()));
          return ReadOutcome::Hit(entry.value());
        }
        Some(_) => {} // expired, retire it below
        None => return ReadOutcome::Miss { expired_old: None },
      }
    }

    // The entry looked expired under the read lock. Re-check under the write
    // lock: a racing writer may have replaced it with a live entry.
    let mut guard = shard.map.write();
    match guard.get(key) {
      Some(entry) if entry.is_expired_at(now) => {
        let expired_old = guard.remove(key).map(|entry| entry.value());
        if expired_old.is_some() {
          self.len.fetch_sub(1, Ordering::Relaxed);
        }
        ReadOutcome::Miss { expired_old }
      }
      Some(entry) => {
        entry.record_access(now, access_expiry(now, entry.expires_at()));
        ReadOutcome::Hit(entry.value())
      }
      None => ReadOutcome::Miss { expired_old: None },
    }
  }

  /// Whether a live entry exists for the key. Does not record an access and
  /// does not retire an expired entry; the sweep will get to it.
  pub(crate) fn contains_live(&self, key: &K) -> bool {
    let now = time::now_nanos();
    let guard = self.shard_for(key).map.read();
    guard.get(key).map_or(false, |entry| !entry.is_expired_at(now))
  }

  /// A weakly consistent snapshot of all live entries, taken shard by shard.
  pub(crate) fn snapshot(&self) -> Vec<(K, Arc<V>)>
  where
    K: Clone,
  {
    let now = time::now_nanos();
    let mut entries = Vec::new();
    for shard in self.shards.iter() {
      let guard = shard.map.read();
      for (key, entry) in guard.iter() {
        if !entry.is_expired_at(now) {
          entries.push((key.clone(), entry.value()));
        }
      }
    }
    entries
  }

  /// Drops every entry without reporting values.
  pub(crate) fn clear(&self) {
    for shard in self.shards.iter() {
      let mut guard = shard.map.write();
      self.len.fetch_sub(guard.len(), Ordering::Relaxed);
      guard.clear();
    }
  }

  /// Removes every entry, returning live ones and expired ones separately so
  /// the caller can notify each with the right event type.
  #[allow(clippy::type_complexity)]
  pub(crate) fn drain(&self) -> (Vec<(K, Arc<V>)>, Vec<(K, Arc<V>)>) {
    let now = time::now_nanos();
    let mut removed = Vec::new();
    let mut expired = Vec::new();
    for shard in self.shards.iter() {
      let mut guard = shard.map.write();
      self.len.fetch_sub(guard.len(), Ordering::Relaxed);
      for (key, entry) in guard.drain() {
        if entry.is_expired_at(now) {
          expired.push((key, entry.value()));
        } else {
          removed.push((key, entry.value()));
        }
      }
    }
    (removed, expired)
  }

  /// Scans up to `limit` entries of one shard and retires those whose expiry
  /// time has passed. Iteration order is arbitrary, which makes the bounded
  /// scan an unbiased-enough sample.
  pub(crate) fn sweep_expired(&self, shard_index: usize, limit: usize) -> Vec<(K, Arc<V>)>
  where
    K: Clone,
  {
    let now = time::now_nanos();
    let shard = &self.shards[shard_index];
    let mut guard = shard.map.write();

    let victims: Vec<K> = guard
      .iter()
      .take(limit)
      .filter(|(_, entry)| entry.is_expired_at(now))
      .map(|(key, _)| key.clone())
      .collect();

    let mut expired = Vec::with_capacity(victims.len());
    for key in victims {
      if let Some(entry) = guard.remove(&key) {
        self.len.fetch_sub(1, Ordering::Relaxed);
        expired.push((key, entry.value()));
      }
    }
    expired
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expiry::NEVER;

  fn store() -> ShardedStore<i32, String, ahash::RandomState> {
    ShardedStore::new(4, ahash::RandomState::new())
  }

  #[test]
  fn insert_then_replace_then_remove() {
    let store = store();

    let outcome = store.compose_and_classify(&1, |_, current| {
      assert!(current.is_none());
      Mutation::Insert("one".to_string(), NEVER)
    });
    assert_eq!(outcome.status, ChangeStatus::Created);
    assert_eq!(store.len(), 1);

    let outcome = store.compose_and_classify(&1, |_, current| {
      assert!(current.is_some());
      Mutation::Replace("uno".to_string(), NEVER)
    });
    assert_eq!(outcome.status, ChangeStatus::Changed);
    assert_eq!(outcome.old_value.as_deref().map(String::as_str), Some("one"));
    assert_eq!(outcome.new_value.as_deref().map(String::as_str), Some("uno"));

    let outcome = store.compose_and_classify(&1, |_, _| Mutation::Remove);
    assert_eq!(outcome.status, ChangeStatus::Removed);
    assert_eq!(store.len(), 0);
  }

  #[test]
  fn expired_entry_is_retired_before_the_mutator_runs() {
    let store = store();
    store.compose_and_classify(&1, |now, _| Mutation::Insert("old".to_string(), now));

    let outcome = store.compose_and_classify(&1, |_, current| {
      assert!(current.is_none(), "mutator must see the expired slot as absent");
      Mutation::Insert("new".to_string(), NEVER)
    });
    assert_eq!(outcome.status, ChangeStatus::Created);
    assert_eq!(outcome.expired_old.as_deref().map(String::as_str), Some("old"));
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn read_retires_expired_entries() {
    let store = store();
    store.compose_and_classify(&1, |now, _| Mutation::Insert("v".to_string(), now));

    match store.read(&1, |_, _| None) {
      ReadOutcome::Miss { expired_old } => {
        assert_eq!(expired_old.as_deref().map(String::as_str), Some("v"));
      }
      ReadOutcome::Hit(_) => panic!("expired entry must not be returned"),
    }
    assert_eq!(store.len(), 0);
  }

  #[test]
  fn keep_on_absent_is_unchanged() {
    let store = store();
    let outcome = store.compose_and_classify(&9, |_, _| Mutation::Keep);
    assert_eq!(outcome.status, ChangeStatus::Unchanged);
    assert!(outcome.old_value.is_none());
  }

  #[test]
  fn sweep_collects_only_expired_entries() {
    let store = store();
    store.compose_and_classify(&1, |now, _| Mutation::Insert("dead".to_string(), now));
    store.compose_and_classify(&2, |_, _| Mutation::Insert("live".to_string(), NEVER));

    let mut expired = Vec::new();
    for index in 0..store.shards.len() {
      expired.extend(store.sweep_expired(index, usize::MAX));
    }
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].0, 1);
    assert_eq!(store.len(), 1);
  }
}
