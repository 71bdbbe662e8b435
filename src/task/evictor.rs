use crate::listener::{EntryEvent, EventType};
use crate::loader::CacheWriter;
use crate::policy::{VictimMeta, VictimPolicy};
use crate::registry::ListenerRegistry;
use crate::rng::FastRng;
use crate::stats::StatisticsCalculator;
use crate::store::{ChangeStatus, Mutation, ShardedStore};

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// The number of entries sampled from each shard on an expiry sweep tick.
const SWEEP_SAMPLE_SIZE: usize = 10;
/// Safety bound on eviction attempts per tick, as a multiple of the excess.
const EVICTION_ATTEMPT_FACTOR: usize = 4;

/// The thread-safe parts of the cache the evictor needs.
pub(crate) struct EvictorContext<K, V, H> {
  pub(crate) store: Arc<ShardedStore<K, V, H>>,
  pub(crate) stats: Arc<StatisticsCalculator>,
  pub(crate) registry: Arc<ListenerRegistry<K, V>>,
  pub(crate) writer: Option<Arc<dyn CacheWriter<K, V>>>,
  pub(crate) policy: Arc<dyn VictimPolicy>,
  pub(crate) capacity: Option<usize>,
  pub(crate) sample_size: usize,
  pub(crate) rng: FastRng,
}

struct StopSignal {
  stopped: Mutex<bool>,
  wakeup: Condvar,
}

/// The dedicated worker that enforces capacity and lazily sweeps expired
/// entries. Its removals feed the same notification path as user-initiated
/// removals, always routed asynchronously so user callbacks cannot stall it.
pub(crate) struct Evictor {
  handle: JoinHandle<()>,
  signal: Arc<StopSignal>,
}

impl Evictor {
  /// Spawns the evictor thread.
  pub(crate) fn spawn<K, V, H>(context: EvictorContext<K, V, H>, tick_interval: Duration) -> Self
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let signal = Arc::new(StopSignal {
      stopped: Mutex::new(false),
      wakeup: Condvar::new(),
    });
    let signal_clone = signal.clone();

    let handle = thread::spawn(move || {
      log::debug!("evictor started");
      loop {
        Self::tick(&context);

        let mut stopped = signal_clone.stopped.lock();
        if *stopped {
          break;
        }
        signal_clone.wakeup.wait_for(&mut stopped, tick_interval);
        if *stopped {
          break;
        }
      }
      log::debug!("evictor stopped");
    });

    Self { handle, signal }
  }

  /// One maintenance pass: sweep a bounded sample for expired entries, then
  /// bring the store back under capacity.
  fn tick<K, V, H>(context: &EvictorContext<K, V, H>)
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    Self::sweep_expired(context);
    Self::enforce_capacity(context);
  }

  /// Retires expired entries found in a bounded per-shard sample. Reads
  /// also detect expiry, so the sweep only tightens notification latency
  /// for entries nobody touches.
  fn sweep_expired<K, V, H>(context: &EvictorContext<K, V, H>)
  where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone,
  {
    for shard_index in 0..context.store.shards.len() {
      let expired = context.store.sweep_expired(shard_index, SWEEP_SAMPLE_SIZE);
      if expired.is_empty() {
        continue;
      }
      context
        .stats
        .expiries
        .fetch_add(expired.len() as u64, Ordering::Relaxed);

      if context.registry.has_listener_for(EventType::Expired) {
        let events = expired
          .into_iter()
          .map(|(key, value)| EntryEvent::expired(key, value))
          .collect();
        context.registry.dispatch_batch(events, EventType::Expired, true);
      }
    }
  }

  /// Removes sampled victims until the store is back under capacity. Each
  /// removal goes through compose-and-classify, so a racing user removal of
  /// the same key cannot be double-reported.
  fn enforce_capacity<K, V, H>(context: &EvictorContext<K, V, H>)
  where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone,
  {
    let Some(capacity) = context.capacity else {
      return;
    };

    let mut excess = context.store.len().saturating_sub(capacity);
    if excess == 0 {
      return;
    }

    let mut attempts = excess * EVICTION_ATTEMPT_FACTOR + 16;
    while excess > 0 && attempts > 0 {
      attempts -= 1;

      let Some(victim) = Self::pick_victim(context) else {
        break;
      };
      let outcome = context.store.compose_and_classify(&victim, |_, current| {
        if current.is_some() {
          Mutation::Remove
        } else {
          Mutation::Keep
        }
      });

      if outcome.status != ChangeStatus::Removed {
        continue;
      }
      excess -= 1;
      context.stats.evictions.fetch_add(1, Ordering::Relaxed);

      // Eviction is delete-through, but a writer failure here has nobody to
      // surface to; log it and keep going.
      if let Some(writer) = &context.writer {
        if let Err(err) = writer.delete(&victim) {
          log::warn!("cache writer failed during eviction: {}", err);
        }
      }

      if let Some(old) = outcome.old_value {
        if context.registry.has_listener_for(EventType::Removed) {
          context
            .registry
            .dispatch(EntryEvent::removed(victim, old), true);
        }
      }
    }
  }

  /// Samples candidates from a pseudo-randomly chosen non-empty shard and
  /// returns the key the policy scores lowest.
  fn pick_victim<K, V, H>(context: &EvictorContext<K, V, H>) -> Option<K>
  where
    K: Eq + Hash + Clone,
    H: BuildHasher + Clone,
  {
    let num_shards = context.store.shards.len();
    let start = context.rng.next_index(num_shards);

    for offset in 0..num_shards {
      let shard = &context.store.shards[(start + offset) & (num_shards - 1)];
      let guard = shard.map.read();
      if guard.is_empty() {
        continue;
      }

      // HashMap iteration order is arbitrary, so the first N entries are a
      // serviceable sample.
      let victim = guard
        .iter()
        .take(context.sample_size)
        .min_by_key(|(_, entry)| {
          context.policy.score(&VictimMeta {
            creation_time: entry.creation_time(),
            last_access: entry.last_access(),
            access_count: entry.access_count(),
          })
        })
        .map(|(key, _)| key.clone());
      if victim.is_some() {
        return victim;
      }
    }
    None
  }

  /// Signals the evictor to stop and waits until `deadline` for it to
  /// finish; a worker stuck in user writer code past the deadline is
  /// detached.
  pub(crate) fn stop(self, deadline: Instant) {
    {
      let mut stopped = self.signal.stopped.lock();
      *stopped = true;
    }
    self.signal.wakeup.notify_all();

    while !self.handle.is_finished() && Instant::now() < deadline {
      thread::sleep(Duration::from_millis(1));
    }
    if self.handle.is_finished() {
      let _ = self.handle.join();
    } else {
      log::warn!("evictor did not stop within the grace period; detaching");
    }
  }
}
