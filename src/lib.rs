//! A concurrent, bounded, in-process key-value cache.
//!
//! `cachet` stores entries in a sharded map with per-entry expiration,
//! enforces a capacity bound with a pluggable, sampled victim-selection
//! policy, and exposes every entry lifecycle transition (created, updated,
//! removed, expired) to registered listeners, delivered inline or through
//! per-listener bounded queues. Optional read-through loading and
//! write-through persistence hook the cache up to an external store.
//!
//! ```
//! use cachet::{CacheBuilder, CreatedExpiry};
//! use std::time::Duration;
//!
//! let cache = CacheBuilder::default()
//!   .capacity(10_000)
//!   .expiry_policy(CreatedExpiry::new(Duration::from_secs(60)))
//!   .build()
//!   .unwrap();
//!
//! cache.put("answer", 42).unwrap();
//! assert_eq!(cache.get(&"answer").unwrap().as_deref(), Some(&42));
//! ```

pub mod builder;
pub mod error;
pub mod expiry;
pub mod listener;
pub mod loader;
pub mod policy;

mod cache;
mod dispatch;
mod entry;
mod pipeline;
mod registry;
mod rng;
mod shared;
mod stats;
mod store;
mod task;
mod time;

pub use builder::CacheBuilder;
pub use cache::{Cache, Iter};
pub use error::{BuildError, CacheError, DynError};
pub use expiry::{CreatedExpiry, Eternal, ExpiryPolicy, ModifiedExpiry, TouchedExpiry, NEVER};
pub use listener::{
  CacheEntryListener, EntryEvent, EventFilter, EventType, FnListener, ListenerConfig,
};
pub use loader::{CacheLoader, CacheWriter, FnLoader};
pub use policy::{FifoPolicy, SampledLfu, SampledLru, VictimMeta, VictimPolicy};
pub use stats::StatsSnapshot;
