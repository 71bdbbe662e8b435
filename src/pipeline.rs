//! The action pipeline.
//!
//! Every public mutation runs as one Action through four stages in a fixed
//! order: compose (the store's atomic compose-and-classify), write-through,
//! notify, statistics. An Action is a value, not a type hierarchy: the
//! mutator plus a data-driven [`StatsRule`] fully describe it, and the
//! event emitted per outcome is a fixed mapping.

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::listener::{EntryEvent, EventType};
use crate::shared::CacheShared;
use crate::stats::StatisticsCalculator;
use crate::store::{ChangeStatus, ComposeOutcome, Mutation};

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;

/// A set of counters to bump, encoded as bits so rules can live in consts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterSet(u8);

impl CounterSet {
  pub(crate) const NONE: CounterSet = CounterSet(0);
  pub(crate) const HIT: CounterSet = CounterSet(1 << 0);
  pub(crate) const MISS: CounterSet = CounterSet(1 << 1);
  pub(crate) const PUT: CounterSet = CounterSet(1 << 2);
  pub(crate) const REMOVAL: CounterSet = CounterSet(1 << 3);

  pub(crate) const fn with(self, other: CounterSet) -> CounterSet {
    CounterSet(self.0 | other.0)
  }

  pub(crate) fn apply(self, stats: &StatisticsCalculator) {
    if self.0 & Self::HIT.0 != 0 {
      stats.hits.fetch_add(1, Ordering::Relaxed);
    }
    if self.0 & Self::MISS.0 != 0 {
      stats.misses.fetch_add(1, Ordering::Relaxed);
    }
    if self.0 & Self::PUT.0 != 0 {
      stats.puts.fetch_add(1, Ordering::Relaxed);
    }
    if self.0 & Self::REMOVAL.0 != 0 {
      stats.removals.fetch_add(1, Ordering::Relaxed);
    }
  }
}

/// Which counters each outcome of an Action bumps. One rule per public
/// operation; the installed-entry put count is always emitted here and never
/// by the store, so double counting is impossible.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatsRule {
  pub(crate) created: CounterSet,
  pub(crate) changed: CounterSet,
  pub(crate) unchanged: CounterSet,
  pub(crate) cas_failed: CounterSet,
  pub(crate) removed: CounterSet,
}

impl StatsRule {
  fn for_status(&self, status: ChangeStatus) -> CounterSet {
    match status {
      ChangeStatus::Created => self.created,
      ChangeStatus::Changed => self.changed,
      ChangeStatus::Unchanged => self.unchanged,
      ChangeStatus::CasFailedEquals => self.cas_failed,
      ChangeStatus::Removed => self.removed,
    }
  }
}

pub(crate) const PUT_RULE: StatsRule = StatsRule {
  created: CounterSet::PUT,
  changed: CounterSet::HIT.with(CounterSet::PUT),
  unchanged: CounterSet::NONE,
  cas_failed: CounterSet::NONE,
  removed: CounterSet::NONE,
};

/// get-and-put also accounts for the read side of the operation.
pub(crate) const GET_AND_PUT_RULE: StatsRule = StatsRule {
  created: CounterSet::MISS.with(CounterSet::PUT),
  changed: CounterSet::HIT.with(CounterSet::PUT),
  unchanged: CounterSet::NONE,
  cas_failed: CounterSet::NONE,
  removed: CounterSet::NONE,
};

pub(crate) const PUT_IF_ABSENT_RULE: StatsRule = StatsRule {
  created: CounterSet::MISS.with(CounterSet::PUT),
  changed: CounterSet::NONE,
  unchanged: CounterSet::HIT,
  cas_failed: CounterSet::NONE,
  removed: CounterSet::NONE,
};

pub(crate) const REPLACE_RULE: StatsRule = StatsRule {
  created: CounterSet::MISS,
  changed: CounterSet::HIT.with(CounterSet::PUT),
  unchanged: CounterSet::MISS,
  cas_failed: CounterSet::HIT,
  removed: CounterSet::NONE,
};

pub(crate) const REMOVE_RULE: StatsRule = StatsRule {
  created: CounterSet::NONE,
  changed: CounterSet::NONE,
  unchanged: CounterSet::MISS,
  cas_failed: CounterSet::HIT,
  removed: CounterSet::REMOVAL,
};

pub(crate) const GET_AND_REMOVE_RULE: StatsRule = StatsRule {
  created: CounterSet::NONE,
  changed: CounterSet::NONE,
  unchanged: CounterSet::MISS,
  cas_failed: CounterSet::NONE,
  removed: CounterSet::HIT.with(CounterSet::REMOVAL),
};

/// Read-through installs count neither as a put nor as a lookup; the read
/// side was already accounted by the miss that triggered the load.
pub(crate) const LOAD_RULE: StatsRule = StatsRule {
  created: CounterSet::NONE,
  changed: CounterSet::NONE,
  unchanged: CounterSet::NONE,
  cas_failed: CounterSet::NONE,
  removed: CounterSet::NONE,
};

/// Runs one Action: compose, then write-through, then notify, then
/// statistics.
///
/// A writer failure does not roll the mutation back; the event and counters
/// for the committed mutation are still produced, and the error surfaces to
/// the caller afterwards.
pub(crate) fn execute<K, V, H, F>(
  shared: &CacheShared<K, V, H>,
  key: &K,
  mutator: F,
  rule: &StatsRule,
) -> Result<ComposeOutcome<V>, CacheError>
where
  K: Eq + Hash + Clone + Send + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone,
  F: FnOnce(u64, Option<&CacheEntry<V>>) -> Mutation<V>,
{
  // Stage 1: compose-and-classify under the per-key section.
  let outcome = shared.store.compose_and_classify(key, mutator);

  // Stage 2: write-through, outside every lock. Unchanged and failed-CAS
  // outcomes never reach the writer.
  let mut writer_error = None;
  if let Some(writer) = &shared.writer {
    let result = match (outcome.status, &outcome.new_value) {
      (ChangeStatus::Created | ChangeStatus::Changed, Some(value)) => writer.write(key, value),
      (ChangeStatus::Removed, _) => writer.delete(key),
      _ => Ok(()),
    };
    if let Err(err) = result {
      writer_error = Some(err);
    }
  }

  // Stage 3: notify.
  notify(shared, key, &outcome, false);

  // Stage 4: statistics.
  rule.for_status(outcome.status).apply(&shared.stats);
  if outcome.expired_old.is_some() {
    shared.stats.expiries.fetch_add(1, Ordering::Relaxed);
  }

  match writer_error {
    Some(err) => Err(CacheError::Writer(err)),
    None => Ok(outcome),
  }
}

/// Emits the events owed for one compose outcome: an expiry notification
/// when the step retired an expired entry, then the event matching the
/// outcome itself. Unchanged and failed-CAS outcomes emit nothing.
pub(crate) fn notify<K, V, H>(
  shared: &CacheShared<K, V, H>,
  key: &K,
  outcome: &ComposeOutcome<V>,
  force_async: bool,
) where
  K: Clone + Send + 'static,
  V: Send + Sync + 'static,
{
  let registry = &shared.registry;

  if let Some(expired) = &outcome.expired_old {
    if registry.has_listener_for(EventType::Expired) {
      registry.dispatch(EntryEvent::expired(key.clone(), expired.clone()), force_async);
    }
  }

  match outcome.status {
    ChangeStatus::Created => {
      if registry.has_listener_for(EventType::Created) {
        if let Some(value) = &outcome.new_value {
          registry.dispatch(EntryEvent::created(key.clone(), value.clone()), force_async);
        }
      }
    }
    ChangeStatus::Changed => {
      if registry.has_listener_for(EventType::Updated) {
        if let (Some(value), Some(old)) = (&outcome.new_value, &outcome.old_value) {
          registry.dispatch(
            EntryEvent::updated(key.clone(), value.clone(), old.clone()),
            force_async,
          );
        }
      }
    }
    ChangeStatus::Removed => {
      if registry.has_listener_for(EventType::Removed) {
        if let Some(old) = &outcome.old_value {
          registry.dispatch(EntryEvent::removed(key.clone(), old.clone()), force_async);
        }
      }
    }
    ChangeStatus::Unchanged | ChangeStatus::CasFailedEquals => {}
  }
}
