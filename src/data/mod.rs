//! Data modules the UI reads and writes through.
//!
//! Each module routes reads through the shared [`CacheLayer`] and reports
//! writes to the [`Invalidator`]. [`DataService`] owns the session-scoped
//! state and wires the modules together.

mod catalog;
mod locations;
mod providers;

pub use catalog::Catalog;
pub use locations::SavedLocations;
pub use providers::ProviderDirectory;

use std::sync::Arc;
use tracing::info;

use crate::backend::types::ResolvedLocation;
use crate::backend::Backend;
use crate::cache::{CacheLayer, Invalidator, TtlCache};
use crate::config::CacheTtls;
use crate::location::LocationResolver;
use crate::retry::RetryPolicy;

/// Everything the client reads or writes, for one signed-in session.
#[derive(Clone)]
pub struct DataService {
  layer: CacheLayer,
  catalog: Catalog,
  providers: ProviderDirectory,
  locations: SavedLocations,
}

impl DataService {
  pub fn new(
    backend: Arc<dyn Backend>,
    cache: Arc<TtlCache>,
    ttls: CacheTtls,
    retry: RetryPolicy,
    fallback: ResolvedLocation,
  ) -> Self {
    let layer = CacheLayer::new(cache, retry);
    let invalidator = Invalidator::new(&layer);
    let resolver = LocationResolver::new(Arc::clone(&backend), fallback);

    let catalog = Catalog::new(
      Arc::clone(&backend),
      layer.clone(),
      invalidator.clone(),
      ttls.services,
    );
    let providers = ProviderDirectory::new(
      Arc::clone(&backend),
      layer.clone(),
      invalidator.clone(),
      resolver,
      ttls.providers,
      ttls.nearby,
    );
    let locations = SavedLocations::new(backend, layer.clone(), invalidator, ttls.locations);

    Self {
      layer,
      catalog,
      providers,
      locations,
    }
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  pub fn providers(&self) -> &ProviderDirectory {
    &self.providers
  }

  pub fn locations(&self) -> &SavedLocations {
    &self.locations
  }

  /// Drop session memory and everything cached for this user.
  pub async fn sign_out(&self) {
    self.layer.reset();
    self.catalog.forget();
    self.layer.cache().clear().await;
    info!("Signed out, cache cleared");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::mock::MockBackend;
  use crate::backend::types::LocationSource;
  use crate::cache::{CacheSource, KeyValueStore, MemoryStore};
  use crate::location::DEFAULT_FALLBACK;
  use serde_json::json;

  fn backend() -> Arc<MockBackend> {
    Arc::new(
      MockBackend::new()
        .with_rows(
          "services",
          vec![json!({"id": "s1", "name": "Deep clean", "category": "Cleaning", "base_price": 60.0})],
        )
        .with_rows(
          "providers",
          vec![json!({"id": "p1", "owner_id": "u1", "display_name": "Sparkle"})],
        )
        .with_rows(
          "service_areas",
          vec![json!({
            "provider_id": "p1",
            "base_location": {"type": "Point", "coordinates": [31.21, 29.99]},
            "radius_km": 10.0
          })],
        )
        .with_rows(
          "saved_locations",
          vec![
            json!({"id": "l1", "user_id": "u1", "label": "Home", "latitude": 30.07, "longitude": 31.28, "is_default": false}),
            json!({"id": "l2", "user_id": "u1", "label": "Shop", "latitude": 30.02, "longitude": 31.44, "is_default": false}),
          ],
        ),
    )
  }

  fn service(backend: Arc<MockBackend>) -> (DataService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = DataService::new(
      backend,
      Arc::new(TtlCache::new(store.clone())),
      CacheTtls::default(),
      RetryPolicy::default(),
      DEFAULT_FALLBACK,
    );
    (service, store)
  }

  #[tokio::test]
  async fn test_default_change_moves_provider() {
    let backend = backend();
    let (data, _store) = service(backend.clone());

    let before = data.providers().get_providers(true).await.unwrap().data;
    assert_eq!(before[0].location_source, LocationSource::BaseLocation);

    data.locations().set_default_location("u1", "l2").await.unwrap();

    let after = data.providers().get_providers(true).await.unwrap();
    assert_eq!(after.source, CacheSource::Network);
    assert_eq!(after.data[0].location_source, LocationSource::DefaultAddress);
    assert_eq!(after.data[0].location, ResolvedLocation::new(30.02, 31.44));
  }

  #[tokio::test]
  async fn test_modules_share_one_cache() {
    let backend = backend();
    let (data, store) = service(backend.clone());

    data.catalog().get_services(true).await.unwrap();
    data.providers().get_provider_by_id("p1", true).await.unwrap();

    let mut keys = store.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["provider:p1", "services"]);
  }

  #[tokio::test]
  async fn test_sign_out_clears_everything() {
    let backend = backend();
    let (data, store) = service(backend.clone());

    data.catalog().get_services(true).await.unwrap();
    data.locations().get_saved_locations("u1", true).await.unwrap();

    data.sign_out().await;

    assert!(store.keys().await.unwrap().is_empty());
    let lookup = data.catalog().get_service_by_id("s1", true).await.unwrap();
    assert_eq!(lookup.source, CacheSource::Network);
    assert_eq!(backend.call_count("select:services"), 2);
  }
}
