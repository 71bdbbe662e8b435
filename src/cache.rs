use crate::error::CacheError;
use crate::listener::{EntryEvent, EventType, ListenerConfig};
use crate::loader::CacheLoader;
use crate::pipeline::{
  self, GET_AND_PUT_RULE, GET_AND_REMOVE_RULE, LOAD_RULE, PUT_IF_ABSENT_RULE, PUT_RULE,
  REMOVE_RULE, REPLACE_RULE,
};
use crate::shared::CacheShared;
use crate::stats::StatsSnapshot;
use crate::store::{ChangeStatus, Mutation, ReadOutcome};

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A thread-safe, bounded key-value cache with per-entry expiration,
/// optional read-through loading and write-through persistence, and an
/// observable stream of entry lifecycle events.
///
/// Handles are cheap to clone and share one underlying cache. Every
/// operation fails with [`CacheError::Closed`] once [`Cache::close`] ran.
#[derive(Debug)]
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  #[inline]
  fn ensure_open(&self) -> Result<(), CacheError> {
    if self.shared.is_open() {
      Ok(())
    } else {
      Err(CacheError::Closed)
    }
  }

  /// Retrieves the value for a key.
  ///
  /// An entry whose expiry time has passed is treated as absent: it is
  /// retired, an `Expired` event fires, and when a loader is configured the
  /// read falls through to it.
  pub fn get(&self, key: &K) -> Result<Option<Arc<V>>, CacheError> {
    self.ensure_open()?;

    let expiry = self.shared.expiry.clone();
    let outcome = self
      .shared
      .store
      .read(key, |now, current| expiry.expiry_for_access(now, current));

    match outcome {
      ReadOutcome::Hit(value) => {
        self.shared.stats.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value))
      }
      ReadOutcome::Miss { expired_old } => {
        if let Some(old) = expired_old {
          self.shared.stats.expiries.fetch_add(1, Ordering::Relaxed);
          if self.shared.registry.has_listener_for(EventType::Expired) {
            self
              .shared
              .registry
              .dispatch(EntryEvent::expired(key.clone(), old), false);
          }
        }
        self.shared.stats.misses.fetch_add(1, Ordering::Relaxed);

        match self.shared.loader.clone() {
          Some(loader) => self.load_through(key, &*loader),
          None => Ok(None),
        }
      }
    }
  }

  /// Retrieves the values for all given keys. Missing keys are simply
  /// absent from the result; with a loader configured they are loaded
  /// one by one.
  pub fn get_all(
    &self,
    keys: impl IntoIterator<Item = K>,
  ) -> Result<HashMap<K, Arc<V>>, CacheError> {
    let mut found = HashMap::new();
    for key in keys {
      if let Some(value) = self.get(&key)? {
        found.insert(key, value);
      }
    }
    Ok(found)
  }

  /// Runs the configured loader for a missed key and installs the result.
  /// The install goes through the regular compose path, so a racing writer
  /// wins cleanly and the install emits `Created` only when it actually
  /// created the entry.
  fn load_through(
    &self,
    key: &K,
    loader: &dyn CacheLoader<K, V>,
  ) -> Result<Option<Arc<V>>, CacheError> {
    let loaded = loader.load(key).map_err(CacheError::Loader)?;
    let Some(value) = loaded else {
      return Ok(None);
    };

    let expiry = self.shared.expiry.clone();
    let outcome = pipeline::execute(
      &self.shared,
      key,
      move |now, current| match current {
        None => Mutation::Insert(value, expiry.expiry_for_creation(now)),
        Some(_) => Mutation::Keep,
      },
      &LOAD_RULE,
    )?;
    Ok(outcome.new_value.or(outcome.old_value))
  }

  /// Associates `value` with `key`, replacing any previous value.
  pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
    self.ensure_open()?;
    let expiry = self.shared.expiry.clone();
    pipeline::execute(
      &self.shared,
      &key,
      move |now, current| match current {
        None => Mutation::Insert(value, expiry.expiry_for_creation(now)),
        Some(entry) => {
          let expires_at = expiry
            .expiry_for_update(now, entry.expires_at())
            .unwrap_or_else(|| entry.expires_at());
          Mutation::Replace(value, expires_at)
        }
      },
      &PUT_RULE,
    )?;
    Ok(())
  }

  /// Associates `value` with `key` and returns the previous value, if any.
  pub fn get_and_put(&self, key: K, value: V) -> Result<Option<Arc<V>>, CacheError> {
    self.ensure_open()?;
    let expiry = self.shared.expiry.clone();
    let outcome = pipeline::execute(
      &self.shared,
      &key,
      move |now, current| match current {
        None => Mutation::Insert(value, expiry.expiry_for_creation(now)),
        Some(entry) => {
          let expires_at = expiry
            .expiry_for_update(now, entry.expires_at())
            .unwrap_or_else(|| entry.expires_at());
          Mutation::Replace(value, expires_at)
        }
      },
      &GET_AND_PUT_RULE,
    )?;
    Ok(outcome.old_value)
  }

  /// Stores every entry of the iterator. Equivalent to repeated `put`;
  /// events fire per key, and the first writer failure aborts the rest.
  pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<(), CacheError> {
    for (key, value) in entries {
      self.put(key, value)?;
    }
    Ok(())
  }

  /// Associates `value` with `key` only if the key has no live entry.
  /// Returns `true` when the value was installed.
  pub fn put_if_absent(&self, key: K, value: V) -> Result<bool, CacheError> {
    self.ensure_open()?;
    let expiry = self.shared.expiry.clone();
    let outcome = pipeline::execute(
      &self.shared,
      &key,
      move |now, current| match current {
        None => Mutation::Insert(value, expiry.expiry_for_creation(now)),
        Some(_) => Mutation::Keep,
      },
      &PUT_IF_ABSENT_RULE,
    )?;
    Ok(outcome.status == ChangeStatus::Created)
  }

  /// Replaces the value for `key` only if a live entry exists. Returns
  /// `true` when the value was replaced.
  pub fn replace(&self, key: &K, value: V) -> Result<bool, CacheError> {
    self.ensure_open()?;
    let outcome = self.replace_outcome(key, value)?;
    Ok(outcome == ChangeStatus::Changed)
  }

  /// Replaces the value for `key` and returns the previous value, if a live
  /// entry existed.
  pub fn get_and_replace(&self, key: &K, value: V) -> Result<Option<Arc<V>>, CacheError> {
    self.ensure_open()?;
    let expiry = self.shared.expiry.clone();
    let outcome = pipeline::execute(
      &self.shared,
      key,
      move |now, current| match current {
        None => Mutation::Keep,
        Some(entry) => {
          let expires_at = expiry
            .expiry_for_update(now, entry.expires_at())
            .unwrap_or_else(|| entry.expires_at());
          Mutation::Replace(value, expires_at)
        }
      },
      &REPLACE_RULE,
    )?;
    Ok(match outcome.status {
      ChangeStatus::Changed => outcome.old_value,
      _ => None,
    })
  }

  fn replace_outcome(&self, key: &K, value: V) -> Result<ChangeStatus, CacheError> {
    let expiry = self.shared.expiry.clone();
    let outcome = pipeline::execute(
      &self.shared,
      key,
      move |now, current| match current {
        None => Mutation::Keep,
        Some(entry) => {
          let expires_at = expiry
            .expiry_for_update(now, entry.expires_at())
            .unwrap_or_else(|| entry.expires_at());
          Mutation::Replace(value, expires_at)
        }
      },
      &REPLACE_RULE,
    )?;
    Ok(outcome.status)
  }

  /// Removes the entry for `key`. Returns `true` when a live entry was
  /// removed.
  pub fn remove(&self, key: &K) -> Result<bool, CacheError> {
    self.ensure_open()?;
    let outcome = pipeline::execute(
      &self.shared,
      key,
      |_, current| match current {
        None => Mutation::Keep,
        Some(_) => Mutation::Remove,
      },
      &REMOVE_RULE,
    )?;
    Ok(outcome.status == ChangeStatus::Removed)
  }

  /// Removes the entry for `key` and returns its value, if a live entry
  /// existed.
  pub fn get_and_remove(&self, key: &K) -> Result<Option<Arc<V>>, CacheError> {
    self.ensure_open()?;
    let outcome = pipeline::execute(
      &self.shared,
      key,
      |_, current| match current {
        None => Mutation::Keep,
        Some(_) => Mutation::Remove,
      },
      &GET_AND_REMOVE_RULE,
    )?;
    Ok(match outcome.status {
      ChangeStatus::Removed => outcome.old_value,
      _ => None,
    })
  }

  /// Whether a live entry exists for `key`. Does not count as a lookup and
  /// does not refresh sliding expiries.
  pub fn contains_key(&self, key: &K) -> Result<bool, CacheError> {
    self.ensure_open()?;
    Ok(self.shared.store.contains_live(key))
  }

  /// Drops every entry without notifying listeners or touching counters.
  pub fn clear(&self) -> Result<(), CacheError> {
    self.ensure_open()?;
    self.shared.store.clear();
    Ok(())
  }

  /// Removes every entry, firing a `Removed` event per live entry (and an
  /// `Expired` event per entry whose deadline had already passed). With a
  /// writer configured, each removed key is deleted through it; the first
  /// writer failure is surfaced after the sweep finishes.
  pub fn remove_all(&self) -> Result<(), CacheError> {
    self.ensure_open()?;
    let (removed, expired) = self.shared.store.drain();

    let mut writer_error = None;
    if let Some(writer) = &self.shared.writer {
      for (key, _) in &removed {
        if let Err(err) = writer.delete(key) {
          writer_error.get_or_insert(err);
        }
      }
    }

    self
      .shared
      .stats
      .removals
      .fetch_add(removed.len() as u64, Ordering::Relaxed);
    self
      .shared
      .stats
      .expiries
      .fetch_add(expired.len() as u64, Ordering::Relaxed);

    if self.shared.registry.has_listener_for(EventType::Removed) {
      let events = removed
        .into_iter()
        .map(|(key, value)| EntryEvent::removed(key, value))
        .collect();
      self
        .shared
        .registry
        .dispatch_batch(events, EventType::Removed, false);
    }
    if self.shared.registry.has_listener_for(EventType::Expired) {
      let events = expired
        .into_iter()
        .map(|(key, value)| EntryEvent::expired(key, value))
        .collect();
      self
        .shared
        .registry
        .dispatch_batch(events, EventType::Expired, false);
    }

    match writer_error {
      Some(err) => Err(CacheError::Writer(err)),
      None => Ok(()),
    }
  }

  /// Removes the entries for the given keys, firing events per key.
  pub fn remove_keys(&self, keys: impl IntoIterator<Item = K>) -> Result<(), CacheError> {
    for key in keys {
      self.remove(&key)?;
    }
    Ok(())
  }

  /// Registers an entry listener. Registering the same listener instance a
  /// second time fails and leaves the first registration active.
  pub fn register_listener(&self, config: ListenerConfig<K, V>) -> Result<(), CacheError> {
    self.ensure_open()?;
    self.shared.registry.register(config)
  }

  /// Deregisters the listener registered with an equivalent config.
  /// Unknown configs are ignored.
  pub fn deregister_listener(&self, config: &ListenerConfig<K, V>) -> Result<(), CacheError> {
    self.ensure_open()?;
    self.shared.registry.deregister(config);
    Ok(())
  }

  /// A weakly consistent iterator over the live entries: a per-shard
  /// snapshot taken at call time, unaffected by later mutations.
  pub fn iter(&self) -> Result<Iter<K, V>, CacheError> {
    self.ensure_open()?;
    Ok(Iter {
      inner: self.shared.store.snapshot().into_iter(),
    })
  }

  /// The number of stored entries, including expired ones not yet retired.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// A point-in-time snapshot of the cache's counters.
  pub fn stats(&self) -> StatsSnapshot {
    self.shared.stats.snapshot()
  }

  /// Closes the cache: stops the evictor, drains listener queues within the
  /// configured grace period, and fails all subsequent operations.
  /// Idempotent.
  pub fn close(&self) {
    self.shared.close();
  }

  /// Whether the cache is no longer open.
  pub fn is_closed(&self) -> bool {
    !self.shared.is_open()
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: PartialEq + Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Replaces the value for `key` only if the current value equals `old`.
  /// Returns `true` when the value was replaced.
  pub fn replace_if_equals(&self, key: &K, old: &V, new: V) -> Result<bool, CacheError> {
    self.ensure_open()?;
    let expiry = self.shared.expiry.clone();
    let outcome = pipeline::execute(
      &self.shared,
      key,
      move |now, current| match current {
        None => Mutation::Keep,
        Some(entry) if *entry.value() == *old => {
          let expires_at = expiry
            .expiry_for_update(now, entry.expires_at())
            .unwrap_or_else(|| entry.expires_at());
          Mutation::Replace(new, expires_at)
        }
        Some(_) => Mutation::KeepCasFailed,
      },
      &REPLACE_RULE,
    )?;
    Ok(outcome.status == ChangeStatus::Changed)
  }

  /// Removes the entry for `key` only if its current value equals `old`.
  /// Returns `true` when the entry was removed.
  pub fn remove_if_equals(&self, key: &K, old: &V) -> Result<bool, CacheError> {
    self.ensure_open()?;
    let outcome = pipeline::execute(
      &self.shared,
      key,
      |_, current| match current {
        None => Mutation::Keep,
        Some(entry) if *entry.value() == *old => Mutation::Remove,
        Some(_) => Mutation::KeepCasFailed,
      },
      &REMOVE_RULE,
    )?;
    Ok(outcome.status == ChangeStatus::Removed)
  }
}

/// A weakly consistent snapshot iterator over a cache's entries.
pub struct Iter<K, V> {
  inner: std::vec::IntoIter<(K, Arc<V>)>,
}

impl<K, V> Iterator for Iter<K, V> {
  type Item = (K, Arc<V>);

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.inner.size_hint()
  }
}
