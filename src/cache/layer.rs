//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::BackendError;
use crate::retry::RetryPolicy;

use super::flight::SingleFlight;
use super::traits::{CacheResult, Cacheable};
use super::ttl::TtlCache;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the data modules and the backend, wrapping every
/// remote read in a TTL cache, bounded retry and stale fallback.
#[derive(Clone)]
pub struct CacheLayer {
  cache: Arc<TtlCache>,
  retry: RetryPolicy,
  flights: SingleFlight,
}

impl CacheLayer {
  /// Create a new cache layer over the given cache.
  pub fn new(cache: Arc<TtlCache>, retry: RetryPolicy) -> Self {
    Self {
      cache,
      retry,
      flights: SingleFlight::new(),
    }
  }

  pub fn cache(&self) -> &Arc<TtlCache> {
    &self.cache
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    self.retry
  }

  /// Number of remote calls currently shared between callers.
  pub fn in_flight(&self) -> usize {
    self.flights.in_flight()
  }

  pub(crate) fn flights(&self) -> &SingleFlight {
    &self.flights
  }

  /// Forget in-progress calls, e.g. on sign-out.
  pub fn reset(&self) {
    self.flights.clear();
  }

  /// Fetch `key` with a cache-or-network strategy.
  ///
  /// 1. If `use_cache`, a live cache entry is returned without any network call
  /// 2. Otherwise run `remote_call` under the retry policy
  /// 3. On success, write the result to the cache and return it
  /// 4. On failure, serve whatever live entry the cache still holds (flagged
  ///    `Stale`), else return the error unchanged
  ///
  /// Concurrent calls for the same key share one run of steps 2-3.
  pub async fn fetch<T, F, Fut>(
    &self,
    key: &str,
    remote_call: F,
    ttl: Duration,
    use_cache: bool,
  ) -> Result<CacheResult<T>, BackendError>
  where
    T: Cacheable,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
  {
    if use_cache {
      if let Some(entry) = self.cache.get_entry::<T>(key).await {
        debug!(key, "Cache hit");
        return Ok(CacheResult::from_cache(entry.data, entry.expiry));
      }
    }

    let (call, started) = self.flights.join(key, |ticket| {
      let cache = Arc::clone(&self.cache);
      let retry = self.retry;
      let key = key.to_string();

      async move {
        let data = retry.run(remote_call).await?;
        let value = serde_json::to_value(&data)?;

        if ticket.is_revoked() {
          debug!(key, "Invalidated while in flight, not caching result");
        } else {
          cache.set(&key, &value, ttl).await;
          // An invalidation that raced the write must win
          if ticket.is_revoked() {
            cache.invalidate(&key).await;
          }
        }
        Ok::<_, BackendError>(value)
      }
    });

    if !started {
      debug!(key, "Joining remote call already in flight");
    }

    let outcome = match call.await {
      Ok(value) => serde_json::from_value::<T>(value).map_err(BackendError::from),
      Err(e) => Err(e),
    };

    match outcome {
      Ok(data) => {
        info!(key, "Fetched from network");
        Ok(CacheResult::from_network(data))
      }
      Err(e) => match self.cache.get_entry::<T>(key).await {
        Some(entry) => {
          warn!(key, error = %e, "Remote call failed, serving cached data");
          Ok(CacheResult::stale(entry.data, entry.expiry))
        }
        None => {
          error!(key, error = %e, "Remote call failed with no cached fallback");
          Err(e)
        }
      },
    }
  }
}
