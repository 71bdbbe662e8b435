use super::{VictimMeta, VictimPolicy};

/// Approximate LFU: the sampled candidate with the fewest recorded accesses
/// is evicted first. Ties fall to whichever candidate the sample visited
/// first, which is acceptable for an approximation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampledLfu;

impl VictimPolicy for SampledLfu {
  fn score(&self, meta: &VictimMeta) -> u64 {
    meta.access_count
  }
}
