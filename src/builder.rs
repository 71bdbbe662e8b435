use crate::cache::Cache;
use crate::error::BuildError;
use crate::expiry::{Eternal, ExpiryPolicy};
use crate::listener::ListenerConfig;
use crate::loader::{CacheLoader, CacheWriter};
use crate::policy::{SampledLfu, VictimPolicy};
use crate::registry::ListenerRegistry;
use crate::rng::FastRng;
use crate::shared::CacheShared;
use crate::stats::StatisticsCalculator;
use crate::store::ShardedStore;
use crate::task::evictor::{Evictor, EvictorContext};

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A builder for creating [`Cache`] instances.
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  capacity: Option<usize>,
  shards: usize,
  expiry: Arc<dyn ExpiryPolicy>,
  victim_policy: Arc<dyn VictimPolicy>,
  sample_size: usize,
  evictor_tick_interval: Option<Duration>,
  loader: Option<Arc<dyn CacheLoader<K, V>>>,
  writer: Option<Arc<dyn CacheWriter<K, V>>>,
  listeners: Vec<ListenerConfig<K, V>>,
  dispatch_queue_capacity: usize,
  enqueue_timeout: Duration,
  shutdown_grace: Duration,
  hasher: H,
  _key_marker: PhantomData<K>,
  _value_marker: PhantomData<V>,
}

impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("capacity", &self.capacity)
      .field("shards", &self.shards)
      .field("sample_size", &self.sample_size)
      .field("has_loader", &self.loader.is_some())
      .field("has_writer", &self.writer.is_some())
      .field("listeners", &self.listeners.len())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Bounds the cache to at most `capacity` entries. The evictor brings the
  /// store back under this bound; between its ticks the store may briefly
  /// exceed it.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = Some(capacity);
    self
  }

  /// Sets the number of concurrent shards. Rounded up to a power of two.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards.max(1).next_power_of_two();
    self
  }

  /// Sets the expiration policy consulted on entry creation, access and
  /// update. Defaults to [`Eternal`].
  pub fn expiry_policy(mut self, policy: impl ExpiryPolicy + 'static) -> Self {
    self.expiry = Arc::new(policy);
    self
  }

  /// Sets the victim-selection policy used for capacity eviction.
  /// Defaults to [`SampledLfu`].
  pub fn victim_policy(mut self, policy: impl VictimPolicy + 'static) -> Self {
    self.victim_policy = Arc::new(policy);
    self
  }

  /// Sets how many candidates the evictor samples per victim selection.
  pub fn sample_size(mut self, sample_size: usize) -> Self {
    self.sample_size = sample_size;
    self
  }

  /// Sets the tick interval of the background evictor.
  /// (Primarily for testing purposes.)
  #[doc(hidden)]
  pub fn evictor_tick_interval(mut self, interval: Duration) -> Self {
    self.evictor_tick_interval = Some(interval);
    self
  }

  /// Configures read-through loading.
  pub fn loader(mut self, loader: impl CacheLoader<K, V> + 'static) -> Self {
    self.loader = Some(Arc::new(loader));
    self
  }

  /// Configures write-through persistence.
  pub fn writer(mut self, writer: impl CacheWriter<K, V> + 'static) -> Self {
    self.writer = Some(Arc::new(writer));
    self
  }

  /// Registers an entry listener at build time.
  pub fn listener(mut self, config: ListenerConfig<K, V>) -> Self {
    self.listeners.push(config);
    self
  }

  /// Sets the per-listener bounded queue capacity for async delivery.
  pub fn dispatch_queue_capacity(mut self, capacity: usize) -> Self {
    self.dispatch_queue_capacity = capacity.max(1);
    self
  }

  /// Sets how long an enqueue onto a full listener queue may block before
  /// the event is dropped and counted.
  pub fn enqueue_timeout(mut self, timeout: Duration) -> Self {
    self.enqueue_timeout = timeout;
    self
  }

  /// Sets how long `close` waits for background workers to drain.
  pub fn shutdown_grace(mut self, grace: Duration) -> Self {
    self.shutdown_grace = grace;
    self
  }
}

// --- Default Constructor ---
impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a new `CacheBuilder` with default settings: unbounded, eternal
  /// entries, sampled-LFU eviction.
  pub fn new() -> Self {
    Self {
      capacity: None,
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      expiry: Arc::new(Eternal),
      victim_policy: Arc::new(SampledLfu),
      sample_size: 8,
      evictor_tick_interval: None,
      loader: None,
      writer: None,
      listeners: Vec::new(),
      dispatch_queue_capacity: 128,
      enqueue_timeout: Duration::from_millis(500),
      shutdown_grace: Duration::from_secs(2),
      hasher: H::default(),
      _key_marker: PhantomData,
      _value_marker: PhantomData,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build ---
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Sets the hasher for the cache.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }

  /// Builds the cache, spawning the evictor when the configuration bounds
  /// capacity or expires entries.
  pub fn build(mut self) -> Result<Cache<K, V, H>, BuildError> {
    self.validate()?;

    let store = Arc::new(ShardedStore::new(self.shards, self.hasher.clone()));
    let stats = Arc::new(StatisticsCalculator::new());
    let registry = Arc::new(ListenerRegistry::new(
      stats.clone(),
      self.dispatch_queue_capacity,
      self.enqueue_timeout,
    ));
    for config in self.listeners.drain(..) {
      if registry.register(config).is_err() {
        registry.shutdown(Duration::ZERO);
        return Err(BuildError::DuplicateListener);
      }
    }

    let needs_evictor = self.capacity.is_some() || !self.expiry.is_eternal();
    let evictor = if needs_evictor {
      let context = EvictorContext {
        store: Arc::clone(&store),
        stats: Arc::clone(&stats),
        registry: Arc::clone(&registry),
        writer: self.writer.clone(),
        policy: Arc::clone(&self.victim_policy),
        capacity: self.capacity,
        sample_size: self.sample_size,
        rng: FastRng::new(0x5ca1ab1e),
      };
      let tick = self.evictor_tick_interval.unwrap_or(Duration::from_secs(1));
      Some(Evictor::spawn(context, tick))
    } else {
      None
    };

    Ok(Cache {
      shared: Arc::new(CacheShared::new(
        store,
        stats,
        registry,
        self.expiry,
        self.loader,
        self.writer,
        evictor,
        self.capacity,
        self.shutdown_grace,
      )),
    })
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.capacity == Some(0) {
      return Err(BuildError::ZeroCapacity);
    }
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    if self.sample_size == 0 {
      return Err(BuildError::ZeroSampleSize);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_capacity_is_rejected() {
    let result: Result<Cache<i32, i32>, _> = CacheBuilder::default().capacity(0).build();
    assert_eq!(result.err(), Some(BuildError::ZeroCapacity));
  }

  #[test]
  fn zero_sample_size_is_rejected() {
    let result: Result<Cache<i32, i32>, _> = CacheBuilder::default().sample_size(0).build();
    assert_eq!(result.err(), Some(BuildError::ZeroSampleSize));
  }

  #[test]
  fn shard_count_rounds_to_power_of_two() {
    let builder: CacheBuilder<i32, i32> = CacheBuilder::default().shards(5);
    assert_eq!(builder.shards, 8);
  }
}
