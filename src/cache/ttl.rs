//! Time-bounded cache on top of a key-value store.
//!
//! Every failure in here is logged and swallowed: callers only ever see a
//! hit or a miss.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::keys::pattern_matches;
use super::store::KeyValueStore;

/// Source of the current time, injectable so expiry can be tested.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  pub fn advance(&self, by: Duration) {
    if let Ok(mut now) = self.now.lock() {
      *now += by;
    }
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
  }
}

/// What actually gets written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  pub expiry: DateTime<Utc>,
}

/// Key-value cache with per-entry expiry.
pub struct TtlCache {
  store: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
}

impl TtlCache {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self::with_clock(store, Arc::new(SystemClock))
  }

  pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Get a live value for `key`, purging it if it has expired.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.get_entry(key).await.map(|entry| entry.data)
  }

  /// Like `get`, but keeps the expiry alongside the value.
  pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let raw = match self.store.get_item(key).await {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "Cache read failed, treating as miss");
        return None;
      }
    };

    let entry: CacheEntry<serde_json::Value> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "Corrupt cache entry, treating as miss");
        self.remove(key).await;
        return None;
      }
    };

    // Null data is an invalidation marker
    if self.now() > entry.expiry || entry.data.is_null() {
      debug!(key, "Cache entry expired");
      self.remove(key).await;
      return None;
    }

    match serde_json::from_value(entry.data) {
      Ok(data) => Some(CacheEntry {
        data,
        expiry: entry.expiry,
      }),
      Err(e) => {
        warn!(key, error = %e, "Cached value has unexpected shape, treating as miss");
        self.remove(key).await;
        None
      }
    }
  }

  /// Store `value` under `key` for `ttl`.
  pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
    let entry = CacheEntry {
      data: value,
      expiry: self.now() + ttl,
    };
    self.write(key, &entry).await;
  }

  /// Make sure the next read of `key` misses.
  pub async fn invalidate(&self, key: &str) {
    let marker = CacheEntry {
      data: serde_json::Value::Null,
      expiry: self.now() - Duration::seconds(1),
    };
    debug!(key, "Invalidating cache entry");
    self.write(key, &marker).await;
  }

  /// Invalidate every stored key matching a `*` glob. Returns how many matched.
  pub async fn invalidate_matching(&self, pattern: &str) -> usize {
    if !pattern.contains('*') {
      self.invalidate(pattern).await;
      return 1;
    }

    let keys = match self.store.keys().await {
      Ok(keys) => keys,
      Err(e) => {
        warn!(pattern, error = %e, "Failed to list cache keys for invalidation");
        return 0;
      }
    };

    let mut matched = 0;
    for key in keys.iter().filter(|k| pattern_matches(pattern, k)) {
      self.invalidate(key).await;
      matched += 1;
    }
    matched
  }

  /// Drop every entry.
  pub async fn clear(&self) {
    match self.store.keys().await {
      Ok(keys) => {
        for key in keys {
          self.remove(&key).await;
        }
      }
      Err(e) => warn!(error = %e, "Failed to list cache keys for clearing"),
    }
  }

  async fn write<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) {
    let raw = match serde_json::to_string(entry) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, error = %e, "Failed to serialize cache entry");
        return;
      }
    };

    if let Err(e) = self.store.set_item(key, &raw).await {
      warn!(key, error = %e, "Cache write failed");
    }
  }

  async fn remove(&self, key: &str) {
    if let Err(e) = self.store.remove_item(key).await {
      warn!(key, error = %e, "Failed to purge cache entry");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::MemoryStore;
  use async_trait::async_trait;
  use chrono::TimeZone;
  use color_eyre::eyre::eyre;
  use serde_json::json;

  fn setup() -> (TtlCache, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let cache = TtlCache::with_clock(store.clone(), clock.clone());
    (cache, store, clock)
  }

  #[tokio::test]
  async fn test_value_lives_until_expiry() {
    let (cache, store, clock) = setup();
    let services = json!([{"id": "s1", "price": 60}]);

    cache.set("services", &services, Duration::hours(6)).await;

    clock.advance(Duration::hours(5));
    assert_eq!(cache.get::<serde_json::Value>("services").await, Some(services.clone()));

    // Exactly at expiry is still live
    clock.advance(Duration::hours(1));
    assert_eq!(cache.get::<serde_json::Value>("services").await, Some(services));

    clock.advance(Duration::hours(1));
    assert_eq!(cache.get::<serde_json::Value>("services").await, None);
    // Purged on the read that found it expired
    assert_eq!(store.get_item("services").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_invalidate_forces_miss() {
    let (cache, _store, _clock) = setup();
    cache.set("providers", &vec![1, 2, 3], Duration::hours(6)).await;

    cache.invalidate("providers").await;

    assert_eq!(cache.get::<Vec<i32>>("providers").await, None);
  }

  #[tokio::test]
  async fn test_invalidate_matching_glob() {
    let (cache, _store, _clock) = setup();
    cache.set("provider-service:a", &1, Duration::hours(1)).await;
    cache.set("provider-service:b", &2, Duration::hours(1)).await;
    cache.set("services", &3, Duration::hours(1)).await;

    let matched = cache.invalidate_matching("provider-service:*").await;

    assert_eq!(matched, 2);
    assert_eq!(cache.get::<i32>("provider-service:a").await, None);
    assert_eq!(cache.get::<i32>("provider-service:b").await, None);
    assert_eq!(cache.get::<i32>("services").await, Some(3));
  }

  #[tokio::test]
  async fn test_corrupt_entry_is_a_miss() {
    let (cache, store, _clock) = setup();
    store.set_item("services", "not json").await.unwrap();

    assert_eq!(cache.get::<Vec<i32>>("services").await, None);
    assert_eq!(store.get_item("services").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_wrong_shape_entry_is_purged() {
    let (cache, store, _clock) = setup();
    cache.set("services", &"not a list", Duration::hours(1)).await;

    assert_eq!(cache.get::<Vec<i32>>("services").await, None);
    assert_eq!(store.get_item("services").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_clear_removes_everything() {
    let (cache, store, _clock) = setup();
    cache.set("a", &1, Duration::hours(1)).await;
    cache.set("b", &2, Duration::hours(1)).await;

    cache.clear().await;

    assert!(store.keys().await.unwrap().is_empty());
  }

  struct BrokenStore;

  #[async_trait]
  impl KeyValueStore for BrokenStore {
    async fn get_item(&self, _key: &str) -> color_eyre::Result<Option<String>> {
      Err(eyre!("disk unavailable"))
    }

    async fn set_item(&self, _key: &str, _value: &str) -> color_eyre::Result<()> {
      Err(eyre!("disk full"))
    }

    async fn remove_item(&self, _key: &str) -> color_eyre::Result<()> {
      Err(eyre!("disk unavailable"))
    }

    async fn keys(&self) -> color_eyre::Result<Vec<String>> {
      Err(eyre!("disk unavailable"))
    }
  }

  #[tokio::test]
  async fn test_store_failures_are_swallowed() {
    let cache = TtlCache::new(Arc::new(BrokenStore));

    cache.set("services", &vec![1], Duration::hours(1)).await;
    assert_eq!(cache.get::<Vec<i32>>("services").await, None);
    cache.invalidate("services").await;
    assert_eq!(cache.invalidate_matching("service:*").await, 0);
  }
}
