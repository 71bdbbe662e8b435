use std::error::Error;
use std::fmt;

/// Boxed error type accepted from user-provided loaders and writers.
pub type DynError = Box<dyn Error + Send + Sync + 'static>;

/// Errors surfaced by cache operations.
#[derive(Debug)]
pub enum CacheError {
  /// The operation was invoked on a cache that is closing or closed.
  Closed,
  /// A read-through loader failed. No cache state was changed.
  Loader(DynError),
  /// A write-through writer failed. The in-memory mutation had already
  /// committed and is not rolled back.
  Writer(DynError),
  /// The same listener instance was registered a second time. The first
  /// registration remains active.
  ListenerAlreadyRegistered,
}

impl fmt::Display for CacheError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheError::Closed => write!(f, "cache is not open"),
      CacheError::Loader(err) => write!(f, "cache loader failed: {}", err),
      CacheError::Writer(err) => write!(f, "cache writer failed: {}", err),
      CacheError::ListenerAlreadyRegistered => {
        write!(f, "cache entry listener may not be registered twice")
      }
    }
  }
}

impl Error for CacheError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      CacheError::Loader(err) | CacheError::Writer(err) => Some(err.as_ref()),
      _ => None,
    }
  }
}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with a capacity of zero, which is not allowed
  /// for a bounded cache. Leave the capacity unset for an unbounded cache.
  ZeroCapacity,
  /// The cache was configured with zero shards, which is not allowed.
  ZeroShards,
  /// The eviction sample size cannot be zero.
  ZeroSampleSize,
  /// The same listener instance was supplied to the builder twice.
  DuplicateListener,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroCapacity => write!(f, "bounded cache capacity cannot be zero"),
      BuildError::ZeroShards => write!(f, "shard count cannot be zero"),
      BuildError::ZeroSampleSize => write!(f, "eviction sample size cannot be zero"),
      BuildError::DuplicateListener => {
        write!(f, "cache entry listener may not be registered twice")
      }
    }
  }
}

impl Error for BuildError {}
