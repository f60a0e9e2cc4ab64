//! Serde-deserializable types matching backend rows.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

use super::types::{ProviderRow, ResolvedLocation, ServiceArea};

/// Decode a backend response into rows. A single object is treated as one row.
pub fn rows<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, BackendError> {
  let value = match value {
    Value::Null => return Ok(Vec::new()),
    Value::Array(_) => value,
    other => Value::Array(vec![other]),
  };
  Ok(serde_json::from_value(value)?)
}

/// Decode the first row of a response, if any.
pub fn first_row<T: DeserializeOwned>(value: Value) -> Result<Option<T>, BackendError> {
  Ok(rows(value)?.into_iter().next())
}

// ============================================================================
// Geometry
// ============================================================================

/// GeoJSON point as PostGIS serializes a geography column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGeoPoint {
  #[serde(rename = "type", default = "point_type")]
  pub kind: String,
  /// `[longitude, latitude]`
  pub coordinates: Vec<f64>,
}

impl ApiGeoPoint {
  pub fn from_location(location: ResolvedLocation) -> Self {
    Self {
      kind: point_type(),
      coordinates: vec![location.longitude, location.latitude],
    }
  }

  pub fn to_location(&self) -> Option<ResolvedLocation> {
    match self.coordinates.as_slice() {
      [longitude, latitude, ..] => Some(ResolvedLocation::new(*latitude, *longitude)),
      _ => None,
    }
  }
}

fn point_type() -> String {
  "Point".to_string()
}

// ============================================================================
// Providers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProvider {
  pub id: String,
  pub owner_id: String,
  pub display_name: String,
  pub rating: Option<f64>,
  pub base_price: Option<f64>,
  pub status: Option<String>,
}

impl From<ApiProvider> for ProviderRow {
  fn from(p: ApiProvider) -> Self {
    Self {
      id: p.id,
      owner_id: p.owner_id,
      display_name: p.display_name,
      rating: p.rating,
      base_price: p.base_price,
      status: p.status,
      distance_km: None,
    }
  }
}

/// Row returned by the `nearby_providers` procedure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNearbyProvider {
  pub provider_id: String,
  pub owner_id: String,
  pub display_name: String,
  pub rating: Option<f64>,
  pub distance_km: f64,
  pub base_price: Option<f64>,
}

impl From<ApiNearbyProvider> for ProviderRow {
  fn from(p: ApiNearbyProvider) -> Self {
    Self {
      id: p.provider_id,
      owner_id: p.owner_id,
      display_name: p.display_name,
      rating: p.rating,
      base_price: p.base_price,
      status: None,
      distance_km: Some(p.distance_km),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiProviderService {
  pub provider_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiServiceArea {
  pub provider_id: String,
  pub base_location: Option<ApiGeoPoint>,
  pub radius_km: Option<f64>,
}

impl From<ApiServiceArea> for ServiceArea {
  fn from(a: ApiServiceArea) -> Self {
    Self {
      provider_id: a.provider_id,
      base_location: a.base_location.as_ref().and_then(ApiGeoPoint::to_location),
      radius_km: a.radius_km,
    }
  }
}
