use std::sync::atomic::{AtomicU64, Ordering};

const WEYL_CONSTANT: u64 = 0x9E3779B97F4A7C15;

/// A fast, non-cryptographically secure pseudo-random number generator using
/// a Weyl sequence on an atomic integer. Used to spread eviction sampling
/// across shards without a per-thread RNG.
#[derive(Debug)]
pub(crate) struct FastRng {
  state: AtomicU64,
}

impl FastRng {
  /// Creates a new RNG with a given seed.
  pub(crate) fn new(seed: u64) -> Self {
    Self {
      state: AtomicU64::new(if seed == 0 { 1 } else { seed }),
    }
  }

  /// Atomically advances the Weyl sequence and returns the new state.
  #[inline(always)]
  fn next_weyl(&self) -> u64 {
    // Ordering::Relaxed is sufficient because we only need atomicity for
    // this one value; no other memory operations synchronize with it.
    self.state.fetch_add(WEYL_CONSTANT, Ordering::Relaxed)
  }

  /// Returns a pseudo-random index in `0..len`. `len` must be non-zero.
  #[inline(always)]
  pub(crate) fn next_index(&self, len: usize) -> usize {
    (self.next_weyl() % len as u64) as usize
  }
}

#[cfg(test)]
mod tests {
  use super::FastRng;

  #[test]
  fn indices_stay_in_range() {
    let rng = FastRng::new(7);
    for _ in 0..1000 {
      assert!(rng.next_index(13) < 13);
    }
  }
}
