//! Result types shared by everything that reads through the cache.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Values that can travel through the cache.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Result from a cache-aware fetch, including data and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the cached copy expires (if from cache)
  pub expires_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      expires_at: None,
    }
  }

  /// Unexpired data served without a network call.
  pub fn from_cache(data: T, expires_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      expires_at: Some(expires_at),
    }
  }

  /// Data remembered in memory for this session.
  pub fn from_memory(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Memory,
      expires_at: None,
    }
  }

  /// Cached data served because the network call failed.
  pub fn stale(data: T, expires_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Stale,
      expires_at: Some(expires_at),
    }
  }

  /// True when the network call failed and this is fallback data.
  pub fn is_stale(&self) -> bool {
    self.source == CacheSource::Stale
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      expires_at: self.expires_at,
    }
  }

  pub fn into_data(self) -> T {
    self.data
  }
}

/// Indicates where fetched data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its TTL
  Cache,
  /// Data from the in-session memo
  Memory,
  /// Network failed, serving what the cache still had
  Stale,
}
