//! Coordinate resolution for providers.
//!
//! Priority, first usable wins:
//! 1. default saved address of the provider's owning account
//! 2. base location declared in the provider's service area
//! 3. the configured city-center fallback

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::api_types::{rows, ApiServiceArea};
use crate::backend::types::{
  LocationSource, ProviderRecord, ProviderRow, ResolvedLocation, SavedLocation, ServiceArea,
};
use crate::backend::{Backend, Filter};
use crate::error::BackendError;

/// City center used when a provider has no usable coordinates at all.
pub const DEFAULT_FALLBACK: ResolvedLocation = ResolvedLocation::new(30.0444, 31.2357);

/// Pick a provider's coordinates from the available sources.
pub fn resolve_location(
  default_address: Option<ResolvedLocation>,
  base_location: Option<ResolvedLocation>,
  fallback: ResolvedLocation,
) -> (ResolvedLocation, LocationSource) {
  if let Some(location) = default_address.filter(ResolvedLocation::is_valid) {
    return (location, LocationSource::DefaultAddress);
  }
  if let Some(location) = base_location.filter(ResolvedLocation::is_valid) {
    return (location, LocationSource::BaseLocation);
  }
  (fallback, LocationSource::Fallback)
}

/// Applies the chain to whole batches with one lookup per source.
#[derive(Clone)]
pub struct LocationResolver {
  backend: Arc<dyn Backend>,
  fallback: ResolvedLocation,
}

impl LocationResolver {
  pub fn new(backend: Arc<dyn Backend>, fallback: ResolvedLocation) -> Self {
    Self { backend, fallback }
  }

  pub fn fallback(&self) -> ResolvedLocation {
    self.fallback
  }

  /// Resolve coordinates for every row.
  pub async fn resolve_batch(&self, rows: Vec<ProviderRow>) -> Result<Vec<ProviderRecord>, BackendError> {
    if rows.is_empty() {
      return Ok(Vec::new());
    }

    let mut owner_ids: Vec<&str> = rows.iter().map(|r| r.owner_id.as_str()).collect();
    owner_ids.sort_unstable();
    owner_ids.dedup();
    let provider_ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();

    let (defaults, bases) = futures::try_join!(
      self.default_addresses(&owner_ids),
      self.base_locations(&provider_ids),
    )?;

    let records: Vec<ProviderRecord> = rows
      .into_iter()
      .map(|row| {
        let (location, source) = resolve_location(
          defaults.get(&row.owner_id).copied(),
          bases.get(&row.id).copied(),
          self.fallback,
        );
        ProviderRecord::new(row, location, source)
      })
      .collect();

    debug!(
      providers = records.len(),
      from_default_address = records
        .iter()
        .filter(|r| r.location_source == LocationSource::DefaultAddress)
        .count(),
      from_fallback = records
        .iter()
        .filter(|r| r.location_source == LocationSource::Fallback)
        .count(),
      "Resolved provider coordinates"
    );

    Ok(records)
  }

  /// Default saved address per owner account.
  async fn default_addresses(
    &self,
    owner_ids: &[&str],
  ) -> Result<HashMap<String, ResolvedLocation>, BackendError> {
    let filters = [
      Filter::in_list("user_id", owner_ids.iter()),
      Filter::eq("is_default", true),
    ];
    let locations: Vec<SavedLocation> = rows(self.backend.select("saved_locations", &filters).await?)?;

    Ok(
      locations
        .into_iter()
        .map(|l| (l.user_id.clone(), l.coordinates()))
        .collect(),
    )
  }

  /// Declared base location per provider.
  async fn base_locations(
    &self,
    provider_ids: &[&str],
  ) -> Result<HashMap<String, ResolvedLocation>, BackendError> {
    let filters = [Filter::in_list("provider_id", provider_ids.iter())];
    let areas: Vec<ApiServiceArea> = rows(self.backend.select("service_areas", &filters).await?)?;

    Ok(
      areas
        .into_iter()
        .map(ServiceArea::from)
        .filter_map(|a| a.base_location.map(|loc| (a.provider_id, loc)))
        .collect(),
    )
  }
}
