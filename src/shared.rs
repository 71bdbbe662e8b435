use crate::expiry::ExpiryPolicy;
use crate::loader::{CacheLoader, CacheWriter};
use crate::registry::ListenerRegistry;
use crate::stats::StatisticsCalculator;
use crate::store::ShardedStore;
use crate::task::evictor::Evictor;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// Cache lifecycle states. Closing is transitional: the evictor and the
// dispatcher workers are draining.
pub(crate) const STATE_OPEN: u8 = 0;
pub(crate) const STATE_CLOSING: u8 = 1;
pub(crate) const STATE_CLOSED: u8 = 2;

/// The internal, thread-safe core shared by every handle of one cache.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: Arc<ShardedStore<K, V, H>>,
  pub(crate) stats: Arc<StatisticsCalculator>,
  pub(crate) registry: Arc<ListenerRegistry<K, V>>,
  pub(crate) expiry: Arc<dyn ExpiryPolicy>,
  pub(crate) loader: Option<Arc<dyn CacheLoader<K, V>>>,
  pub(crate) writer: Option<Arc<dyn CacheWriter<K, V>>>,
  pub(crate) evictor: Mutex<Option<Evictor>>,
  pub(crate) capacity: Option<usize>,
  pub(crate) shutdown_grace: Duration,
  state: AtomicU8,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("len", &self.store.len())
      .field("capacity", &self.capacity)
      .field("listeners", &self.registry.len())
      .field("state", &self.state.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl<K, V, H> CacheShared<K, V, H> {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    store: Arc<ShardedStore<K, V, H>>,
    stats: Arc<StatisticsCalculator>,
    registry: Arc<ListenerRegistry<K, V>>,
    expiry: Arc<dyn ExpiryPolicy>,
    loader: Option<Arc<dyn CacheLoader<K, V>>>,
    writer: Option<Arc<dyn CacheWriter<K, V>>>,
    evictor: Option<Evictor>,
    capacity: Option<usize>,
    shutdown_grace: Duration,
  ) -> Self {
    Self {
      store,
      stats,
      registry,
      expiry,
      loader,
      writer,
      evictor: Mutex::new(evictor),
      capacity,
      shutdown_grace,
      state: AtomicU8::new(STATE_OPEN),
    }
  }

  #[inline]
  pub(crate) fn is_open(&self) -> bool {
    self.state.load(Ordering::Acquire) == STATE_OPEN
  }

  /// Transitions Open -> Closing -> Closed. Stops the evictor, then drains
  /// every listener worker within the grace period. Idempotent: only the
  /// caller that wins the Open -> Closing transition does the work.
  pub(crate) fn close(&self) {
    if self
      .state
      .compare_exchange(STATE_OPEN, STATE_CLOSING, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return;
    }

    let deadline = Instant::now() + self.shutdown_grace;
    if let Some(evictor) = self.evictor.lock().take() {
      evictor.stop(deadline);
    }
    self.registry.shutdown(self.shutdown_grace);

    self.state.store(STATE_CLOSED, Ordering::Release);
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    // Last handle gone: stop the evictor and let listener workers drain.
    if let Some(evictor) = self.evictor.get_mut().take() {
      evictor.stop(Instant::now() + self.shutdown_grace);
    }
    self.registry.shutdown(self.shutdown_grace);
  }
}
