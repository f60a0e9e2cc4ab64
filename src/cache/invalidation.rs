//! Which cached views each mutation makes stale.
//!
//! Mutation code never lists keys itself; it reports what it did and the
//! table below decides what to bust.

use std::sync::Arc;
use tracing::debug;

use super::flight::SingleFlight;
use super::layer::CacheLayer;
use super::ttl::TtlCache;

/// A successful write against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
  CreateService,
  UpdateService,
  DeleteService,
  UpdateProvider,
  UpdateServiceArea,
  CreateSavedLocation,
  UpdateSavedLocation,
  DeleteSavedLocation,
  SetDefaultLocation,
}

impl Mutation {
  pub const ALL: [Mutation; 9] = [
    Self::CreateService,
    Self::UpdateService,
    Self::DeleteService,
    Self::UpdateProvider,
    Self::UpdateServiceArea,
    Self::CreateSavedLocation,
    Self::UpdateSavedLocation,
    Self::DeleteSavedLocation,
    Self::SetDefaultLocation,
  ];
}

const CATALOG_VIEWS: &[&str] = &["services", "service:*", "provider-service:*"];

const PROVIDER_VIEWS: &[&str] = &[
  "providers",
  "provider:*",
  "provider-service:*",
  "providers-near:*",
];

// Default addresses feed provider coordinates
const LOCATION_VIEWS: &[&str] = &[
  "saved-locations:*",
  "saved-location:*",
  "providers",
  "provider:*",
  "provider-service:*",
  "providers-near:*",
];

/// Key patterns invalidated by `mutation`.
pub fn dependencies(mutation: Mutation) -> &'static [&'static str] {
  match mutation {
    Mutation::CreateService | Mutation::UpdateService | Mutation::DeleteService => CATALOG_VIEWS,
    Mutation::UpdateProvider | Mutation::UpdateServiceArea => PROVIDER_VIEWS,
    Mutation::CreateSavedLocation
    | Mutation::UpdateSavedLocation
    | Mutation::DeleteSavedLocation
    | Mutation::SetDefaultLocation => LOCATION_VIEWS,
  }
}

/// Applies the dependency table to a cache layer.
#[derive(Clone)]
pub struct Invalidator {
  cache: Arc<TtlCache>,
  flights: SingleFlight,
}

impl Invalidator {
  pub fn new(layer: &CacheLayer) -> Self {
    Self {
      cache: Arc::clone(layer.cache()),
      flights: layer.flights().clone(),
    }
  }

  /// Bust every view `mutation` depends on. Returns the number of keys invalidated.
  ///
  /// Calls in flight for those keys are revoked first, so they can't write
  /// pre-mutation data back over the markers.
  pub async fn after(&self, mutation: Mutation) -> usize {
    let mut invalidated = 0;
    let mut revoked = 0;
    for pattern in dependencies(mutation) {
      revoked += self.flights.revoke_matching(pattern);
      invalidated += self.cache.invalidate_matching(pattern).await;
    }
    debug!(?mutation, invalidated, revoked, "Invalidated cached views");
    invalidated
  }
}
