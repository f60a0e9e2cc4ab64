//! Cache key shapes and glob matching over them.

use sha2::{Digest, Sha256};

/// Key for the full service catalog.
pub const SERVICES: &str = "services";

/// Key for the full provider directory.
pub const PROVIDERS: &str = "providers";

/// Every logical query shape that is cached, one key per shape.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheKey {
  Services,
  Service { id: String },
  Providers,
  Provider { id: String },
  ProvidersForService { service_id: String },
  NearbyProviders { latitude: f64, longitude: f64, radius_km: f64 },
  SavedLocations { user_id: String },
  SavedLocation { id: String },
}

impl CacheKey {
  /// The string the entry is stored under.
  pub fn as_key(&self) -> String {
    match self {
      Self::Services => SERVICES.to_string(),
      Self::Service { id } => format!("service:{}", id),
      Self::Providers => PROVIDERS.to_string(),
      Self::Provider { id } => format!("provider:{}", id),
      Self::ProvidersForService { service_id } => format!("provider-service:{}", service_id),
      Self::NearbyProviders {
        latitude,
        longitude,
        radius_km,
      } => format!(
        "providers-near:{}",
        short_hash(&normalize_nearby(*latitude, *longitude, *radius_km))
      ),
      Self::SavedLocations { user_id } => format!("saved-locations:{}", user_id),
      Self::SavedLocation { id } => format!("saved-location:{}", id),
    }
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.as_key())
  }
}

/// Round coordinates to ~100m so nearby searches from almost the same spot share a key.
fn normalize_nearby(latitude: f64, longitude: f64, radius_km: f64) -> String {
  format!("{:.3},{:.3},{:.1}", latitude, longitude, radius_km)
}

/// First 16 hex chars of the SHA256 of `input`.
fn short_hash(input: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  let digest = hasher.finalize();
  hex::encode(&digest[..8])
}

/// Checks if a cache key matches a glob pattern where `*` matches any run of characters.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
  if !pattern.contains('*') {
    return pattern == key;
  }

  let segments: Vec<&str> = pattern.split('*').collect();
  let mut remaining = key;

  for (i, segment) in segments.iter().enumerate() {
    if segment.is_empty() {
      continue;
    }

    if i == 0 {
      // Anchored at the start
      match remaining.strip_prefix(segment) {
        Some(rest) => remaining = rest,
        None => return false,
      }
    } else if i == segments.len() - 1 {
      // Anchored at the end
      return remaining.ends_with(segment);
    } else {
      match remaining.find(segment) {
        Some(pos) => remaining = &remaining[pos + segment.len()..],
        None => return false,
      }
    }
  }

  true
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_shapes() {
    assert_eq!(CacheKey::Services.as_key(), "services");
    assert_eq!(CacheKey::Service { id: "s1".into() }.as_key(), "service:s1");
    assert_eq!(
      CacheKey::ProvidersForService {
        service_id: "plumbing".into()
      }
      .as_key(),
      "provider-service:plumbing"
    );
    assert_eq!(
      CacheKey::SavedLocations { user_id: "u1".into() }.as_key(),
      "saved-locations:u1"
    );
  }

  #[test]
  fn test_nearby_key_is_stable_for_close_points() {
    let a = CacheKey::NearbyProviders {
      latitude: 30.04441,
      longitude: 31.23571,
      radius_km: 10.0,
    };
    let b = CacheKey::NearbyProviders {
      latitude: 30.04439,
      longitude: 31.23568,
      radius_km: 10.0,
    };
    let c = CacheKey::NearbyProviders {
      latitude: 30.04441,
      longitude: 31.23571,
      radius_km: 25.0,
    };

    assert_eq!(a.as_key(), b.as_key());
    assert_ne!(a.as_key(), c.as_key());
    assert!(a.as_key().starts_with("providers-near:"));
    assert_eq!(a.as_key().len(), "providers-near:".len() + 16);
  }

  #[test]
  fn test_pattern_exact() {
    assert!(pattern_matches("services", "services"));
    assert!(!pattern_matches("services", "service:1"));
  }

  #[test]
  fn test_pattern_trailing_wildcard() {
    assert!(pattern_matches("provider:*", "provider:abc"));
    assert!(pattern_matches("provider:*", "provider:"));
    assert!(!pattern_matches("provider:*", "providers"));
    assert!(!pattern_matches("provider:*", "provider-service:x"));
  }

  #[test]
  fn test_pattern_middle_and_leading_wildcards() {
    assert!(pattern_matches("*", "anything"));
    assert!(pattern_matches("*:u1", "saved-locations:u1"));
    assert!(pattern_matches("saved-*:u1", "saved-locations:u1"));
    assert!(!pattern_matches("saved-*:u1", "saved-locations:u2"));
  }
}
