use crate::listener::{CacheEntryListener, EntryEvent};
use crate::stats::StatisticsCalculator;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// How often the worker re-checks its stop flag while the queue is idle.
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Invokes a listener, containing any panic. A misbehaving listener must not
/// poison the pipeline or its worker.
pub(crate) fn deliver_guarded<K, V>(
  listener: &Arc<dyn CacheEntryListener<K, V>>,
  event: &EntryEvent<K, V>,
  stats: &StatisticsCalculator,
) {
  let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
  if outcome.is_err() {
    stats.listener_failures.fetch_add(1, Ordering::Relaxed);
    log::error!("cache entry listener panicked; event discarded");
  }
}

/// The bounded queue and dedicated worker behind one listener registration.
///
/// Every registration owns one, so eviction-driven dispatch can route events
/// asynchronously even for listeners that normally deliver inline. Delivery
/// order for a single registration matches enqueue order.
pub(crate) struct DispatchChannel<K, V> {
  tx: Sender<EntryEvent<K, V>>,
  stop: Arc<AtomicBool>,
  handle: Mutex<Option<JoinHandle<()>>>,
  enqueue_timeout: Duration,
}

impl<K, V> DispatchChannel<K, V>
where
  K: Send + 'static,
  V: Send + Sync + 'static,
{
  /// Spawns the worker thread for a registration.
  pub(crate) fn spawn(
    listener: Arc<dyn CacheEntryListener<K, V>>,
    capacity: usize,
    enqueue_timeout: Duration,
    stats: Arc<StatisticsCalculator>,
  ) -> Self {
    let (tx, rx) = bounded::<EntryEvent<K, V>>(capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
      loop {
        if stop_flag.load(Ordering::Acquire) {
          break;
        }
        match rx.recv_timeout(WORKER_POLL_INTERVAL) {
          Ok(event) => deliver_guarded(&listener, &event, &stats),
          Err(RecvTimeoutError::Timeout) => {}
          Err(RecvTimeoutError::Disconnected) => break,
        }
      }
      // Drain whatever is still queued before exiting.
      while let Ok(event) = rx.try_recv() {
        deliver_guarded(&listener, &event, &stats);
      }
    });

    Self {
      tx,
      stop,
      handle: Mutex::new(Some(handle)),
      enqueue_timeout,
    }
  }
}

impl<K, V> DispatchChannel<K, V> {
  /// Enqueues one event. Blocks up to the configured timeout when the queue
  /// is full; on timeout the event is dropped and counted.
  pub(crate) fn enqueue(&self, event: EntryEvent<K, V>, stats: &StatisticsCalculator) {
    if self.stop.load(Ordering::Acquire) {
      return;
    }
    if self.tx.send_timeout(event, self.enqueue_timeout).is_err() {
      stats.events_dropped.fetch_add(1, Ordering::Relaxed);
      log::warn!("listener queue full past enqueue timeout; event dropped");
    }
  }

  /// Signals the worker to drain and stop, waiting until `deadline`. A
  /// worker still busy in user code after the deadline is detached.
  pub(crate) fn shutdown(&self, deadline: Instant) {
    self.stop.store(true, Ordering::Release);
    let handle = self.handle.lock().take();
    if let Some(handle) = handle {
      while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
      }
      if handle.is_finished() {
        let _ = handle.join();
      } else {
        log::warn!("listener worker did not drain within the grace period; detaching");
      }
    }
  }
}

impl<K, V> Drop for DispatchChannel<K, V> {
  fn drop(&mut self) {
    // Dropping the sender disconnects the channel; the worker drains any
    // remaining events and terminates on its own.
    self.stop.store(true, Ordering::Release);
  }
}
