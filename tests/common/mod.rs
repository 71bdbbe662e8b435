use std::hash::{BuildHasher, Hasher};
use std::sync::mpsc::Sender;

use cachet::{Cache, CacheBuilder, CacheEntryListener, EntryEvent, EventType};

// A custom hasher that allows us to control which shard a key is assigned to.
// It simply uses the integer value of the key as its hash, so for a 4-shard
// cache key 0 lands in shard 0, key 1 in shard 1, and so on.
#[derive(Clone, Default)]
pub struct ShardControllingHasher;

impl BuildHasher for ShardControllingHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0)
  }
}

pub struct TestHasher(u64);

impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, _: &[u8]) {
    unimplemented!()
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

/// A flattened copy of one delivered event, cheap to assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
  pub event_type: EventType,
  pub key: i32,
  pub value: Option<i32>,
  pub old_value: Option<i32>,
}

/// A listener that forwards every delivered event over an mpsc channel.
pub struct ChannelListener {
  pub sender: Sender<EventRecord>,
}

impl CacheEntryListener<i32, i32> for ChannelListener {
  fn on_event(&self, event: &EntryEvent<i32, i32>) {
    let _ = self.sender.send(EventRecord {
      event_type: event.event_type,
      key: event.key,
      value: event.value.as_deref().copied(),
      old_value: event.old_value.as_deref().copied(),
    });
  }
}

pub fn build_test_cache(shards: usize) -> Cache<i32, i32, ShardControllingHasher> {
  CacheBuilder::new()
    .shards(shards)
    .hasher(ShardControllingHasher)
    .build()
    .unwrap()
}
