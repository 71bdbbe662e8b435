mod common;

use common::{ChannelListener, EventRecord};

use cachet::{CacheBuilder, CacheError, EventType, ListenerConfig};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[test]
fn events_match_the_mutation_kind() {
  let (tx, rx) = mpsc::channel();
  let cache = CacheBuilder::default()
    .listener(ListenerConfig::new(ChannelListener { sender: tx }))
    .build()
    .unwrap();

  cache.put(1, 10).unwrap();
  cache.put(1, 20).unwrap();
  cache.remove(&1).unwrap();

  let created = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(
    created,
    EventRecord {
      event_type: EventType::Created,
      key: 1,
      value: Some(10),
      old_value: None,
    }
  );

  let updated = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(
    updated,
    EventRecord {
      event_type: EventType::Updated,
      key: 1,
      value: Some(20),
      old_value: Some(10),
    }
  );

  let removed = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(
    removed,
    EventRecord {
      event_type: EventType::Removed,
      key: 1,
      value: None,
      old_value: Some(20),
    }
  );
}

// A listener subscribed to created events only must see nothing for updates,
// and nothing at all after deregistration.
#[test]
fn subscription_mask_and_deregistration_silence_events() {
  let (tx, rx) = mpsc::channel();
  let config =
    ListenerConfig::new(ChannelListener { sender: tx }).event_types(&[EventType::Created]);
  let cache = CacheBuilder::default().build().unwrap();
  cache.register_listener(config.clone()).unwrap();

  cache.put(1, 1).unwrap();
  let event = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(event.event_type, EventType::Created);

  cache.put(1, 2).unwrap();
  assert!(rx.try_recv().is_err(), "updates are not subscribed");

  cache.deregister_listener(&config).unwrap();
  cache.put(1, 3).unwrap();
  cache.put(2, 1).unwrap();
  assert!(rx.try_recv().is_err(), "deregistered listeners see nothing");
}

#[test]
fn duplicate_registration_fails_and_keeps_the_first() {
  let (tx, rx) = mpsc::channel();
  let config = ListenerConfig::new(ChannelListener { sender: tx });
  let cache = CacheBuilder::default().build().unwrap();

  cache.register_listener(config.clone()).unwrap();
  assert!(matches!(
    cache.register_listener(config.clone()),
    Err(CacheError::ListenerAlreadyRegistered)
  ));

  cache.put(1, 1).unwrap();
  assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap().event_type, EventType::Created);
  assert!(rx.try_recv().is_err(), "the event must arrive exactly once");
}

#[test]
fn old_values_can_be_omitted() {
  let (tx, rx) = mpsc::channel();
  let cache = CacheBuilder::default()
    .listener(ListenerConfig::new(ChannelListener { sender: tx }).old_value_required(false))
    .build()
    .unwrap();

  cache.put(1, 10).unwrap();
  cache.put(1, 20).unwrap();
  cache.remove(&1).unwrap();

  let created = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(created.old_value, None);
  let updated = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(updated.event_type, EventType::Updated);
  assert_eq!(updated.value, Some(20));
  assert_eq!(updated.old_value, None);
  let removed = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(removed.event_type, EventType::Removed);
  assert_eq!(removed.old_value, None);
}

#[test]
fn filters_select_events() {
  let (tx, rx) = mpsc::channel();
  let cache = CacheBuilder::default()
    .listener(
      ListenerConfig::new(ChannelListener { sender: tx }).filter(|event| event.key % 2 == 0),
    )
    .build()
    .unwrap();

  cache.put(1, 1).unwrap();
  cache.put(2, 2).unwrap();
  cache.put(3, 3).unwrap();
  cache.put(4, 4).unwrap();

  let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(first.key, 2);
  let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
  assert_eq!(second.key, 4);
  assert!(rx.try_recv().is_err());
}

// An asynchronous listener receives events off the mutating thread, in
// enqueue order.
#[test]
fn async_listener_preserves_order_off_thread() {
  let (tx, rx) = mpsc::channel();
  let mutating_thread = thread::current().id();
  let cache = CacheBuilder::default()
    .listener(
      ListenerConfig::new(cachet::FnListener(move |event: &cachet::EntryEvent<i32, i32>| {
        assert_ne!(thread::current().id(), mutating_thread);
        let _ = tx.send(event.value.as_deref().copied());
      }))
      .synchronous(false),
    )
    .build()
    .unwrap();

  for value in 0..50 {
    cache.put(1, value).unwrap();
  }

  for value in 0..50 {
    let received = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(received, Some(value));
  }
}

#[test]
fn panicking_listener_does_not_poison_the_caller() {
  let (tx, rx) = mpsc::channel();
  let cache = CacheBuilder::default()
    .listener(ListenerConfig::new(cachet::FnListener(
      |_: &cachet::EntryEvent<i32, i32>| panic!("misbehaving listener"),
    )))
    .listener(ListenerConfig::new(ChannelListener { sender: tx }))
    .build()
    .unwrap();

  cache.put(1, 1).unwrap();

  // The caller survived and the healthy listener still got the event.
  assert_eq!(rx.recv_timeout(RECV_TIMEOUT).unwrap().event_type, EventType::Created);
  assert_eq!(cache.stats().listener_failures, 1);
}
