//! Entry lifecycle events and listener registration types.

use std::fmt;
use std::sync::Arc;

/// The kind of lifecycle transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
  /// A key that was absent is now present.
  Created,
  /// A present key had its value replaced.
  Updated,
  /// A present key was removed by a user operation or by eviction.
  Removed,
  /// An entry was dropped because its expiry time passed.
  Expired,
}

impl EventType {
  pub(crate) const ALL: [EventType; 4] = [
    EventType::Created,
    EventType::Updated,
    EventType::Removed,
    EventType::Expired,
  ];

  /// The bit this event type occupies in the registry's presence mask.
  #[inline]
  pub(crate) fn bit(self) -> u8 {
    match self {
      EventType::Created => 1 << 0,
      EventType::Updated => 1 << 1,
      EventType::Removed => 1 << 2,
      EventType::Expired => 1 << 3,
    }
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventType::Created => write!(f, "created"),
      EventType::Updated => write!(f, "updated"),
      EventType::Removed => write!(f, "removed"),
      EventType::Expired => write!(f, "expired"),
    }
  }
}

/// A single entry lifecycle event as delivered to listeners.
///
/// `value` carries the entry's value after the transition (present for
/// `Created` and `Updated`); `old_value` carries the value before the
/// transition (present for `Updated`, `Removed` and `Expired`, and only when
/// the registration asked for old values).
pub struct EntryEvent<K, V> {
  pub event_type: EventType,
  pub key: K,
  pub value: Option<Arc<V>>,
  pub old_value: Option<Arc<V>>,
}

impl<K: Clone, V> Clone for EntryEvent<K, V> {
  fn clone(&self) -> Self {
    Self {
      event_type: self.event_type,
      key: self.key.clone(),
      value: self.value.clone(),
      old_value: self.old_value.clone(),
    }
  }
}

impl<K: fmt::Debug, V> fmt::Debug for EntryEvent<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EntryEvent")
      .field("event_type", &self.event_type)
      .field("key", &self.key)
      .field("has_value", &self.value.is_some())
      .field("has_old_value", &self.old_value.is_some())
      .finish()
  }
}

impl<K, V> EntryEvent<K, V> {
  pub(crate) fn created(key: K, value: Arc<V>) -> Self {
    Self {
      event_type: EventType::Created,
      key,
      value: Some(value),
      old_value: None,
    }
  }

  pub(crate) fn updated(key: K, value: Arc<V>, old_value: Arc<V>) -> Self {
    Self {
      event_type: EventType::Updated,
      key,
      value: Some(value),
      old_value: Some(old_value),
    }
  }

  pub(crate) fn removed(key: K, old_value: Arc<V>) -> Self {
    Self {
      event_type: EventType::Removed,
      key,
      value: None,
      old_value: Some(old_value),
    }
  }

  pub(crate) fn expired(key: K, old_value: Arc<V>) -> Self {
    Self {
      event_type: EventType::Expired,
      key,
      value: None,
      old_value: Some(old_value),
    }
  }

  /// The same event with the prior value stripped, for registrations that
  /// did not ask for old values.
  pub(crate) fn without_old_value(&self) -> Self
  where
    K: Clone,
  {
    Self {
      event_type: self.event_type,
      key: self.key.clone(),
      value: self.value.clone(),
      old_value: None,
    }
  }
}

/// A callback invoked for entry lifecycle events.
///
/// Synchronous registrations run the callback on the mutating thread; keep it
/// short and never call back into the cache from it. Panics are caught,
/// logged and counted; they do not propagate to cache callers.
pub trait CacheEntryListener<K, V>: Send + Sync {
  fn on_event(&self, event: &EntryEvent<K, V>);
}

/// A [`CacheEntryListener`] backed by a closure.
pub struct FnListener<F>(pub F);

impl<K, V, F> CacheEntryListener<K, V> for FnListener<F>
where
  F: Fn(&EntryEvent<K, V>) + Send + Sync,
{
  fn on_event(&self, event: &EntryEvent<K, V>) {
    (self.0)(event)
  }
}

/// A predicate deciding whether a given event is delivered to a listener.
pub type EventFilter<K, V> = Arc<dyn Fn(&EntryEvent<K, V>) -> bool + Send + Sync>;

/// Configuration attached to one listener registration.
///
/// A configuration is identified by its listener instance: registering the
/// same instance twice is an error, and deregistration matches by instance.
pub struct ListenerConfig<K, V> {
  pub(crate) listener: Arc<dyn CacheEntryListener<K, V>>,
  pub(crate) event_mask: u8,
  pub(crate) old_value_required: bool,
  pub(crate) synchronous: bool,
  pub(crate) filter: Option<EventFilter<K, V>>,
}

impl<K, V> Clone for ListenerConfig<K, V> {
  fn clone(&self) -> Self {
    Self {
      listener: self.listener.clone(),
      event_mask: self.event_mask,
      old_value_required: self.old_value_required,
      synchronous: self.synchronous,
      filter: self.filter.clone(),
    }
  }
}

impl<K, V> fmt::Debug for ListenerConfig<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ListenerConfig")
      .field("event_mask", &format_args!("{:#06b}", self.event_mask))
      .field("old_value_required", &self.old_value_required)
      .field("synchronous", &self.synchronous)
      .field("has_filter", &self.filter.is_some())
      .finish()
  }
}

impl<K, V> ListenerConfig<K, V> {
  /// Creates a registration for the given listener, subscribed to all event
  /// types, synchronous, with old values delivered.
  pub fn new(listener: impl CacheEntryListener<K, V> + 'static) -> Self {
    Self {
      listener: Arc::new(listener),
      event_mask: EventType::ALL.iter().fold(0, |mask, t| mask | t.bit()),
      old_value_required: true,
      synchronous: true,
      filter: None,
    }
  }

  /// Restricts the registration to the given event types.
  pub fn event_types(mut self, types: &[EventType]) -> Self {
    self.event_mask = types.iter().fold(0, |mask, t| mask | t.bit());
    self
  }

  /// Chooses whether `Updated`, `Removed` and `Expired` events carry the
  /// prior value. Defaults to `true`.
  pub fn old_value_required(mut self, required: bool) -> Self {
    self.old_value_required = required;
    self
  }

  /// Chooses between inline delivery on the mutating thread (`true`) and
  /// delivery through the registration's bounded queue and worker (`false`).
  /// Defaults to `true`.
  pub fn synchronous(mut self, synchronous: bool) -> Self {
    self.synchronous = synchronous;
    self
  }

  /// Installs a filter predicate; events it rejects are not delivered.
  pub fn filter(mut self, filter: impl Fn(&EntryEvent<K, V>) -> bool + Send + Sync + 'static) -> Self {
    self.filter = Some(Arc::new(filter));
    self
  }

  #[inline]
  pub(crate) fn subscribes_to(&self, event_type: EventType) -> bool {
    self.event_mask & event_type.bit() != 0
  }

  /// Two configurations are the same registration when they reference the
  /// same listener instance.
  pub(crate) fn same_listener(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.listener, &other.listener)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn event_bits_are_distinct() {
    let mut seen = 0u8;
    for t in EventType::ALL {
      assert_eq!(seen & t.bit(), 0);
      seen |= t.bit();
    }
  }

  #[test]
  fn config_subscription_mask() {
    let config: ListenerConfig<i32, i32> =
      ListenerConfig::new(FnListener(|_: &EntryEvent<i32, i32>| {}))
        .event_types(&[EventType::Created, EventType::Expired]);
    assert!(config.subscribes_to(EventType::Created));
    assert!(config.subscribes_to(EventType::Expired));
    assert!(!config.subscribes_to(EventType::Updated));
    assert!(!config.subscribes_to(EventType::Removed));
  }

  #[test]
  fn same_listener_is_identity_based() {
    let a: ListenerConfig<i32, i32> = ListenerConfig::new(FnListener(|_: &EntryEvent<i32, i32>| {}));
    let b = a.clone().event_types(&[EventType::Created]);
    let c: ListenerConfig<i32, i32> = ListenerConfig::new(FnListener(|_: &EntryEvent<i32, i32>| {}));
    assert!(a.same_listener(&b));
    assert!(!a.same_listener(&c));
  }
}
