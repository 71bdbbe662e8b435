use crate::dispatch::{deliver_guarded, DispatchChannel};
use crate::error::CacheError;
use crate::listener::{EntryEvent, EventType, ListenerConfig};
use crate::stats::StatisticsCalculator;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// One registered listener plus its dispatch machinery.
pub(crate) struct ListenerEntry<K, V> {
  config: ListenerConfig<K, V>,
  channel: DispatchChannel<K, V>,
  stats: Arc<StatisticsCalculator>,
}

impl<K: Clone, V> ListenerEntry<K, V> {
  /// Delivers one event to this registration, honoring its subscription
  /// set, filter, old-value setting and dispatch mode. `force_async` routes
  /// the event through the worker queue even for synchronous registrations.
  pub(crate) fn deliver(&self, event: &EntryEvent<K, V>, force_async: bool) {
    if !self.config.subscribes_to(event.event_type) {
      return;
    }
    if let Some(filter) = &self.config.filter {
      let passed = catch_unwind(AssertUnwindSafe(|| filter(event)));
      match passed {
        Ok(true) => {}
        Ok(false) => return,
        Err(_) => {
          self.stats.listener_failures.fetch_add(1, Ordering::Relaxed);
          log::error!("cache event filter panicked; event discarded");
          return;
        }
      }
    }

    let strip_old = !self.config.old_value_required && event.old_value.is_some();
    if self.config.synchronous && !force_async {
      if strip_old {
        deliver_guarded(&self.config.listener, &event.without_old_value(), &self.stats);
      } else {
        deliver_guarded(&self.config.listener, event, &self.stats);
      }
    } else {
      let owned = if strip_old {
        event.without_old_value()
      } else {
        event.clone()
      };
      self.channel.enqueue(owned, &self.stats);
    }
  }
}

/// The thread-safe set of listener registrations.
///
/// Register and deregister run under an exclusive section and rebuild both
/// the copy-on-write snapshot and the presence mask; dispatch paths read the
/// mask with a single atomic load and iterate the snapshot without blocking
/// writers.
pub(crate) struct ListenerRegistry<K, V> {
  entries: RwLock<Arc<[Arc<ListenerEntry<K, V>>]>>,
  /// One bit per event type; set when at least one registration subscribes.
  present_mask: AtomicU8,
  stats: Arc<StatisticsCalculator>,
  queue_capacity: usize,
  enqueue_timeout: Duration,
}

impl<K, V> ListenerRegistry<K, V> {
  pub(crate) fn new(
    stats: Arc<StatisticsCalculator>,
    queue_capacity: usize,
    enqueue_timeout: Duration,
  ) -> Self {
    Self {
      entries: RwLock::new(Arc::from(Vec::new())),
      present_mask: AtomicU8::new(0),
      stats,
      queue_capacity,
      enqueue_timeout,
    }
  }

  /// Whether at least one registration subscribes to the given event type.
  /// A single atomic load plus bit test, so dispatch sites can short-circuit
  /// without allocating an event record.
  #[inline]
  pub(crate) fn has_listener_for(&self, event_type: EventType) -> bool {
    self.present_mask.load(Ordering::Acquire) & event_type.bit() != 0
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.read().len()
  }

  /// Removes the registration matching the config's listener instance. The
  /// registration's worker drains its queue in the background. Unknown
  /// configs are ignored.
  pub(crate) fn deregister(&self, config: &ListenerConfig<K, V>) {
    let mut entries = self.entries.write();
    let mut next: Vec<Arc<ListenerEntry<K, V>>> = entries.iter().cloned().collect();
    let before = next.len();
    next.retain(|entry| !entry.config.same_listener(config));
    if next.len() == before {
      return;
    }
    *entries = Arc::from(next);
    // Removing a registration invalidates the presence mask, so rebuild it.
    self.rebuild_mask(&entries);
  }

  fn rebuild_mask(&self, entries: &Arc<[Arc<ListenerEntry<K, V>>]>) {
    let mut mask = 0u8;
    for entry in entries.iter() {
      for event_type in EventType::ALL {
        if entry.config.subscribes_to(event_type) {
          mask |= event_type.bit();
        }
      }
    }
    self.present_mask.store(mask, Ordering::Release);
  }

  /// Drops every registration and waits for the workers to drain, up to the
  /// grace period shared across all of them.
  pub(crate) fn shutdown(&self, grace: Duration) {
    let drained: Arc<[Arc<ListenerEntry<K, V>>]> = {
      let mut entries = self.entries.write();
      let drained = entries.clone();
      *entries = Arc::from(Vec::new());
      self.present_mask.store(0, Ordering::Release);
      drained
    };

    let deadline = Instant::now() + grace;
    for entry in drained.iter() {
      entry.channel.shutdown(deadline);
    }
  }
}

impl<K, V> ListenerRegistry<K, V>
where
  K: Clone + Send + 'static,
  V: Send + Sync + 'static,
{
  /// Adds a registration. Registering the same listener instance twice is
  /// an error; the first registration remains active.
  pub(crate) fn register(&self, config: ListenerConfig<K, V>) -> Result<(), CacheError> {
    let mut entries = self.entries.write();
    if entries.iter().any(|entry| entry.config.same_listener(&config)) {
      return Err(CacheError::ListenerAlreadyRegistered);
    }

    let channel = DispatchChannel::spawn(
      config.listener.clone(),
      self.queue_capacity,
      self.enqueue_timeout,
      self.stats.clone(),
    );
    let entry = Arc::new(ListenerEntry {
      config,
      channel,
      stats: self.stats.clone(),
    });

    let mut next: Vec<Arc<ListenerEntry<K, V>>> = entries.iter().cloned().collect();
    next.push(entry);
    *entries = Arc::from(next);
    self.rebuild_mask(&entries);
    Ok(())
  }

  /// Delivers one event to every interested registration.
  pub(crate) fn dispatch(&self, event: EntryEvent<K, V>, force_async: bool) {
    if !self.has_listener_for(event.event_type) {
      return;
    }
    let snapshot = self.entries.read().clone();
    for entry in snapshot.iter() {
      entry.deliver(&event, force_async);
    }
  }

  /// Delivers a batch of same-type events, preserving batch order per
  /// registration.
  pub(crate) fn dispatch_batch(
    &self,
    events: Vec<EntryEvent<K, V>>,
    event_type: EventType,
    force_async: bool,
  ) {
    if events.is_empty() || !self.has_listener_for(event_type) {
      return;
    }
    let snapshot = self.entries.read().clone();
    for event in &events {
      for entry in snapshot.iter() {
        entry.deliver(event, force_async);
      }
    }
  }
}
