//! Provider directory: every read runs through the coordinate chain.

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;

use crate::backend::api_types::{
  first_row, rows, ApiGeoPoint, ApiNearbyProvider, ApiProvider, ApiProviderService, ApiServiceArea,
};
use crate::backend::types::{
  NearbyQuery, ProviderChanges, ProviderRecord, ProviderRow, ResolvedLocation, ServiceArea,
};
use crate::backend::{Backend, Filter};
use crate::cache::{CacheKey, CacheLayer, CacheResult, Invalidator, Mutation};
use crate::error::BackendError;
use crate::location::LocationResolver;

const PROVIDERS: &str = "providers";
const PROVIDER_SERVICES: &str = "provider_services";
const SERVICE_AREAS: &str = "service_areas";
const NEARBY_RPC: &str = "nearby_providers";

#[derive(Clone)]
pub struct ProviderDirectory {
  backend: Arc<dyn Backend>,
  cache: CacheLayer,
  invalidator: Invalidator,
  resolver: LocationResolver,
  ttl: Duration,
  nearby_ttl: Duration,
}

impl ProviderDirectory {
  pub fn new(
    backend: Arc<dyn Backend>,
    cache: CacheLayer,
    invalidator: Invalidator,
    resolver: LocationResolver,
    ttl: Duration,
    nearby_ttl: Duration,
  ) -> Self {
    Self {
      backend,
      cache,
      invalidator,
      resolver,
      ttl,
      nearby_ttl,
    }
  }

  /// Every provider in the directory.
  pub async fn get_providers(
    &self,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<ProviderRecord>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let resolver = self.resolver.clone();

    self
      .cache
      .fetch(
        &CacheKey::Providers.as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let resolver = resolver.clone();
          async move {
            let providers: Vec<ApiProvider> = rows(backend.select(PROVIDERS, &[]).await?)?;
            resolver
              .resolve_batch(providers.into_iter().map(ProviderRow::from).collect())
              .await
          }
        },
        self.ttl,
        use_cache,
      )
      .await
  }

  /// One provider, or `None` if it doesn't exist.
  pub async fn get_provider_by_id(
    &self,
    id: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Option<ProviderRecord>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let resolver = self.resolver.clone();
    let provider_id = id.to_string();

    self
      .cache
      .fetch(
        &CacheKey::Provider { id: id.to_string() }.as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let resolver = resolver.clone();
          let provider_id = provider_id.clone();
          async move {
            let provider = match backend.select(PROVIDERS, &[Filter::eq("id", &provider_id)]).await {
              Ok(value) => first_row::<ApiProvider>(value)?,
              Err(e) if e.is_not_found() => None,
              Err(e) => return Err(e),
            };

            match provider {
              Some(p) => Ok(resolver.resolve_batch(vec![p.into()]).await?.pop()),
              None => Ok(None),
            }
          }
        },
        self.ttl,
        use_cache,
      )
      .await
  }

  /// Providers offering a given service.
  pub async fn get_providers_for_service(
    &self,
    service_id: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<ProviderRecord>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let resolver = self.resolver.clone();
    let owned_service_id = service_id.to_string();

    self
      .cache
      .fetch(
        &CacheKey::ProvidersForService {
          service_id: service_id.to_string(),
        }
        .as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let resolver = resolver.clone();
          let service_id = owned_service_id.clone();
          async move {
            let links: Vec<ApiProviderService> = rows(
              backend
                .select(PROVIDER_SERVICES, &[Filter::eq("service_id", &service_id)])
                .await?,
            )?;

            if links.is_empty() {
              return Ok(Vec::new());
            }

            let ids = links.into_iter().map(|l| l.provider_id);
            let providers: Vec<ApiProvider> =
              rows(backend.select(PROVIDERS, &[Filter::in_list("id", ids)]).await?)?;

            resolver
              .resolve_batch(providers.into_iter().map(ProviderRow::from).collect())
              .await
          }
        },
        self.ttl,
        use_cache,
      )
      .await
  }

  /// Providers within `query.radius_km` of a point, nearest first.
  pub async fn get_nearby_providers(
    &self,
    query: NearbyQuery,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<ProviderRecord>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let resolver = self.resolver.clone();
    let key = CacheKey::NearbyProviders {
      latitude: query.latitude,
      longitude: query.longitude,
      radius_km: query.radius_km,
    };

    self
      .cache
      .fetch(
        &key.as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let resolver = resolver.clone();
          async move {
            let args = json!({
              "lat": query.latitude,
              "lng": query.longitude,
              "radius_km": query.radius_km,
            });
            let nearby: Vec<ApiNearbyProvider> = rows(backend.rpc(NEARBY_RPC, args).await?)?;
            resolver
              .resolve_batch(nearby.into_iter().map(ProviderRow::from).collect())
              .await
          }
        },
        self.nearby_ttl,
        use_cache,
      )
      .await
  }

  /// Update a provider's profile.
  pub async fn update_provider(
    &self,
    id: &str,
    changes: ProviderChanges,
  ) -> Result<ProviderRecord, BackendError> {
    let value = self
      .backend
      .update(PROVIDERS, &[Filter::eq("id", id)], serde_json::to_value(&changes)?)
      .await?;
    let row: ProviderRow = first_row::<ApiProvider>(value)?
      .ok_or_else(|| BackendError::not_found(format!("Provider {} not found", id)))?
      .into();

    self.invalidator.after(Mutation::UpdateProvider).await;

    let mut records = self.resolver.resolve_batch(vec![row]).await?;
    records
      .pop()
      .ok_or_else(|| BackendError::decode("Resolved no record for updated provider"))
  }

  /// Move a provider's declared base location.
  pub async fn update_service_area(
    &self,
    provider_id: &str,
    base_location: ResolvedLocation,
  ) -> Result<ServiceArea, BackendError> {
    if !base_location.is_valid() {
      return Err(BackendError::decode("Base location is not a valid coordinate"));
    }

    let changes = json!({ "base_location": ApiGeoPoint::from_location(base_location) });
    let value = self
      .backend
      .update(SERVICE_AREAS, &[Filter::eq("provider_id", provider_id)], changes)
      .await?;
    let area = first_row::<ApiServiceArea>(value)?
      .ok_or_else(|| BackendError::not_found(format!("No service area for provider {}", provider_id)))?;

    self.invalidator.after(Mutation::UpdateServiceArea).await;
    Ok(area.into())
  }
}
