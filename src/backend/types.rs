use serde::{Deserialize, Serialize};

/// A bookable service in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
  pub id: String,
  pub name: String,
  pub category: String,
  #[serde(default)]
  pub description: Option<String>,
  pub base_price: f64,
  #[serde(default)]
  pub duration_minutes: Option<u32>,
  #[serde(default = "default_true")]
  pub active: bool,
}

/// Fields for a new catalog service
#[derive(Debug, Clone, Serialize)]
pub struct NewService {
  pub name: String,
  pub category: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub base_price: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_minutes: Option<u32>,
  pub active: bool,
}

/// Partial update of a catalog service; `None` fields are left alone
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub base_price: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_minutes: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub active: Option<bool>,
}

/// An address a user saved on their account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLocation {
  pub id: String,
  pub user_id: String,
  pub label: String,
  #[serde(default)]
  pub address: Option<String>,
  pub latitude: f64,
  pub longitude: f64,
  #[serde(default)]
  pub is_default: bool,
}

impl SavedLocation {
  pub fn coordinates(&self) -> ResolvedLocation {
    ResolvedLocation::new(self.latitude, self.longitude)
  }
}

/// Fields for a new saved location
#[derive(Debug, Clone, Serialize)]
pub struct NewSavedLocation {
  pub user_id: String,
  pub label: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  pub latitude: f64,
  pub longitude: f64,
  pub is_default: bool,
}

/// Partial update of a saved location
#[derive(Debug, Clone, Default, Serialize)]
pub struct SavedLocationChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub latitude: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub longitude: Option<f64>,
}

/// Coordinates chosen for a provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
  pub latitude: f64,
  pub longitude: f64,
}

impl ResolvedLocation {
  pub const fn new(latitude: f64, longitude: f64) -> Self {
    Self {
      latitude,
      longitude,
    }
  }

  /// Finite and within WGS84 bounds
  pub fn is_valid(&self) -> bool {
    self.latitude.is_finite()
      && self.longitude.is_finite()
      && (-90.0..=90.0).contains(&self.latitude)
      && (-180.0..=180.0).contains(&self.longitude)
  }
}

/// Which source won the coordinate chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
  DefaultAddress,
  BaseLocation,
  Fallback,
}

/// Provider attributes as the backend returns them, before coordinates are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRow {
  pub id: String,
  pub owner_id: String,
  pub display_name: String,
  pub rating: Option<f64>,
  pub base_price: Option<f64>,
  pub status: Option<String>,
  /// Only set by proximity search
  pub distance_km: Option<f64>,
}

/// A provider ready for display, with coordinates always present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
  pub id: String,
  pub owner_id: String,
  pub display_name: String,
  pub rating: Option<f64>,
  pub base_price: Option<f64>,
  pub status: Option<String>,
  pub distance_km: Option<f64>,
  pub location: ResolvedLocation,
  pub location_source: LocationSource,
}

impl ProviderRecord {
  pub fn new(row: ProviderRow, location: ResolvedLocation, location_source: LocationSource) -> Self {
    Self {
      id: row.id,
      owner_id: row.owner_id,
      display_name: row.display_name,
      rating: row.rating,
      base_price: row.base_price,
      status: row.status,
      distance_km: row.distance_km,
      location,
      location_source,
    }
  }
}

/// Partial update of a provider profile
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub base_price: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
}

/// Declared operating area of a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceArea {
  pub provider_id: String,
  pub base_location: Option<ResolvedLocation>,
  pub radius_km: Option<f64>,
}

/// Search origin and radius for the proximity lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
  pub latitude: f64,
  pub longitude: f64,
  pub radius_km: f64,
}

fn default_true() -> bool {
  true
}
