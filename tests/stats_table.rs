//! The counter decision table, operation by operation. Each test uses a
//! fresh unbounded cache so no background work moves the counters.

use cachet::{CacheBuilder, StatsSnapshot};

fn deltas(before: &StatsSnapshot, after: &StatsSnapshot) -> (u64, u64, u64, u64) {
  (
    after.hits - before.hits,
    after.misses - before.misses,
    after.puts - before.puts,
    after.removals - before.removals,
  )
}

#[test]
fn put_counts() {
  let cache = CacheBuilder::default().build().unwrap();

  let before = cache.stats();
  cache.put(1, 1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 0, 1, 0), "create");

  let before = cache.stats();
  cache.put(1, 2).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 1, 0), "overwrite");
}

#[test]
fn put_if_absent_counts() {
  let cache = CacheBuilder::default().build().unwrap();

  let before = cache.stats();
  cache.put_if_absent(1, 1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 1, 0), "create");

  let before = cache.stats();
  cache.put_if_absent(1, 2).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 0, 0), "occupied");
}

#[test]
fn replace_counts() {
  let cache = CacheBuilder::default().build().unwrap();

  let before = cache.stats();
  cache.replace(&1, 1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 0, 0), "absent");

  cache.put(1, 1).unwrap();
  let before = cache.stats();
  cache.replace(&1, 2).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 1, 0), "replaced");

  let before = cache.stats();
  cache.replace_if_equals(&1, &99, 3).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 0, 0), "value mismatch");

  let before = cache.stats();
  cache.get_and_replace(&7, 7).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 0, 0), "get-and-replace miss");
}

#[test]
fn get_counts() {
  let cache = CacheBuilder::default().build().unwrap();
  cache.put(1, 1).unwrap();

  let before = cache.stats();
  cache.get(&1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 0, 0), "hit");

  let before = cache.stats();
  cache.get(&2).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 0, 0), "miss");
}

#[test]
fn remove_counts() {
  let cache = CacheBuilder::default().build().unwrap();
  cache.put(1, 1).unwrap();

  let before = cache.stats();
  cache.remove(&1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 0, 0, 1), "removed");

  let before = cache.stats();
  cache.remove(&1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 0, 0), "absent");

  cache.put(2, 2).unwrap();
  let before = cache.stats();
  cache.remove_if_equals(&2, &99).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 0, 0), "value mismatch");
}

#[test]
fn get_and_put_and_get_and_remove_count_both_sides() {
  let cache = CacheBuilder::default().build().unwrap();

  let before = cache.stats();
  cache.get_and_put(1, 1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 1, 0), "create");

  let before = cache.stats();
  cache.get_and_put(1, 2).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 1, 0), "overwrite");

  let before = cache.stats();
  cache.get_and_remove(&1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (1, 0, 0, 1), "removed");

  let before = cache.stats();
  cache.get_and_remove(&1).unwrap();
  assert_eq!(deltas(&before, &cache.stats()), (0, 1, 0, 0), "absent");
}

#[test]
fn counters_are_monotonic_under_mixed_load() {
  let cache = CacheBuilder::default().build().unwrap();
  let mut last = cache.stats();
  for round in 0..100 {
    match round % 5 {
      0 => {
        cache.put(round, round).unwrap();
      }
      1 => {
        let _ = cache.get(&(round - 1)).unwrap();
      }
      2 => {
        let _ = cache.put_if_absent(round, 0).unwrap();
      }
      3 => {
        let _ = cache.remove(&(round - 3)).unwrap();
      }
      _ => {
        let _ = cache.replace(&round, 1).unwrap();
      }
    }
    let now = cache.stats();
    assert!(now.hits >= last.hits);
    assert!(now.misses >= last.misses);
    assert!(now.puts >= last.puts);
    assert!(now.removals >= last.removals);
    last = now;
  }
}
