//! Per-key sharing of in-progress remote calls.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::BackendError;

use super::keys::pattern_matches;

/// Output of a shared call. Values are type-erased to JSON so one map can
/// hold calls for every cached type.
pub type FlightResult = Result<serde_json::Value, BackendError>;

type SharedCall = Shared<BoxFuture<'static, FlightResult>>;

/// Handed to a call when it starts. Revoked once the call's key is
/// invalidated, after which its result must not be written to the cache.
#[derive(Debug, Clone, Default)]
pub struct FlightTicket {
  revoked: Arc<AtomicBool>,
}

impl FlightTicket {
  pub fn is_revoked(&self) -> bool {
    self.revoked.load(Ordering::SeqCst)
  }

  fn revoke(&self) {
    self.revoked.store(true, Ordering::SeqCst);
  }
}

struct Flight {
  id: u64,
  call: SharedCall,
  ticket: FlightTicket,
}

/// Map from cache key to the call currently fetching it.
///
/// An entry removes itself once its call completes, so a later caller
/// starts a fresh call.
#[derive(Clone, Default)]
pub struct SingleFlight {
  calls: Arc<Mutex<HashMap<String, Flight>>>,
  next_id: Arc<AtomicU64>,
}

impl SingleFlight {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, Flight>> {
    match self.calls.lock() {
      Ok(calls) => calls,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  /// Join the call in progress for `key`, or start one with `start`.
  ///
  /// Returns the shared call and whether this caller started it.
  pub fn join<F, Fut>(&self, key: &str, start: F) -> (SharedCall, bool)
  where
    F: FnOnce(FlightTicket) -> Fut,
    Fut: Future<Output = FlightResult> + Send + 'static,
  {
    let mut calls = self.lock();

    if let Some(flight) = calls.get(key) {
      return (flight.call.clone(), false);
    }

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let ticket = FlightTicket::default();
    let registry = Arc::clone(&self.calls);
    let owned_key = key.to_string();
    let work = start(ticket.clone());

    let call = async move {
      let result = work.await;
      if let Ok(mut calls) = registry.lock() {
        // Only remove our own entry; a newer call may have replaced it
        if calls.get(&owned_key).map(|f| f.id) == Some(id) {
          calls.remove(&owned_key);
        }
      }
      result
    }
    .boxed()
    .shared();

    calls.insert(
      key.to_string(),
      Flight {
        id,
        call: call.clone(),
        ticket,
      },
    );
    (call, true)
  }

  /// Number of calls currently in progress.
  pub fn in_flight(&self) -> usize {
    self.lock().len()
  }

  /// Revoke and forget every call whose key matches `pattern`.
  ///
  /// Callers already waiting still get their result; later callers start a
  /// fresh call. Returns how many calls were revoked.
  pub fn revoke_matching(&self, pattern: &str) -> usize {
    let mut calls = self.lock();
    let mut revoked = 0;
    calls.retain(|key, flight| {
      if pattern_matches(pattern, key) {
        flight.ticket.revoke();
        revoked += 1;
        false
      } else {
        true
      }
    });
    revoked
  }

  /// Revoke and forget every call in progress.
  pub fn clear(&self) {
    for (_, flight) in self.lock().drain() {
      flight.ticket.revoke();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_revoke_matching_only_touches_matching_keys() {
    let flights = SingleFlight::new();
    let mut tickets = Vec::new();

    for key in ["services", "service:s1", "providers"] {
      flights.join(key, |ticket| {
        tickets.push(ticket);
        futures::future::pending::<FlightResult>()
      });
    }

    assert_eq!(flights.revoke_matching("service:*"), 1);
    assert_eq!(flights.in_flight(), 2);
    let revoked: Vec<bool> = tickets.iter().map(FlightTicket::is_revoked).collect();
    assert_eq!(revoked, vec![false, true, false]);

    flights.clear();
    assert_eq!(flights.in_flight(), 0);
    assert!(tickets.iter().all(FlightTicket::is_revoked));
  }

  #[tokio::test]
  async fn test_revoked_key_starts_fresh_call() {
    let flights = SingleFlight::new();

    let (_, started) = flights.join("services", |_| futures::future::pending::<FlightResult>());
    assert!(started);
    let (_, started) = flights.join("services", |_| futures::future::pending::<FlightResult>());
    assert!(!started);

    flights.revoke_matching("services");
    let (_, started) = flights.join("services", |_| futures::future::pending::<FlightResult>());
    assert!(started);
  }
}
