use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// A thread-safe, internal counter bundle for the cache.
/// All fields are atomic to allow for lock-free updates, and every counter is
/// monotonic non-decreasing.
#[derive(Debug, Default)]
pub(crate) struct StatisticsCalculator {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Mutations ---
  pub(crate) puts: CachePadded<AtomicU64>,
  pub(crate) removals: CachePadded<AtomicU64>,

  // --- Background removals ---
  pub(crate) evictions: CachePadded<AtomicU64>,
  pub(crate) expiries: CachePadded<AtomicU64>,

  // --- Dispatch health ---
  pub(crate) events_dropped: CachePadded<AtomicU64>,
  pub(crate) listener_failures: CachePadded<AtomicU64>,
}

impl StatisticsCalculator {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Creates a point-in-time snapshot of the current counters.
  pub(crate) fn snapshot(&self) -> StatsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    StatsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      puts: self.puts.load(Ordering::Relaxed),
      removals: self.removals.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      expiries: self.expiries.load(Ordering::Relaxed),
      events_dropped: self.events_dropped.load(Ordering::Relaxed),
      listener_failures: self.listener_failures.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's counters.
#[derive(Clone, PartialEq)]
pub struct StatsSnapshot {
  /// The number of lookups that found a live entry.
  pub hits: u64,
  /// The number of lookups that found nothing, or only an expired entry.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// The number of entries installed or replaced by put-style operations.
  pub puts: u64,
  /// The number of entries removed by user-initiated removal operations.
  pub removals: u64,
  /// The number of entries removed by the evictor to enforce capacity.
  pub evictions: u64,
  /// The number of entries dropped because their expiry time passed.
  pub expiries: u64,
  /// The number of events dropped because a listener queue stayed full past
  /// the enqueue timeout.
  pub events_dropped: u64,
  /// The number of listener invocations that panicked.
  pub listener_failures: u64,
}

impl fmt::Debug for StatsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StatsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("puts", &self.puts)
      .field("removals", &self.removals)
      .field("evictions", &self.evictions)
      .field("expiries", &self.expiries)
      .field("events_dropped", &self.events_dropped)
      .field("listener_failures", &self.listener_failures)
      .finish()
  }
}
