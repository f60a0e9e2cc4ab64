//! Local caching for remote reads.
//!
//! This module provides:
//! - A persistent key-value store abstraction (SQLite on device)
//! - A TTL cache that never fails its callers
//! - The fetch orchestrator: cache, retried remote call, write-through, stale fallback
//! - Single-flight sharing of concurrent remote calls per key
//! - Declarative invalidation of cached views after mutations

mod flight;
mod invalidation;
pub mod keys;
mod layer;
mod store;
mod traits;
mod ttl;

pub use invalidation::{dependencies, Invalidator, Mutation};
pub use keys::CacheKey;
pub use layer::CacheLayer;
pub use store::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheResult, CacheSource, Cacheable};
pub use ttl::{CacheEntry, Clock, ManualClock, SystemClock, TtlCache};
