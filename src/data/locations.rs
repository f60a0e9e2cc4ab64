//! Addresses saved on user accounts.

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;

use crate::backend::api_types::{first_row, rows};
use crate::backend::types::{NewSavedLocation, SavedLocation, SavedLocationChanges};
use crate::backend::{Backend, Filter};
use crate::cache::{CacheKey, CacheLayer, CacheResult, Invalidator, Mutation};
use crate::error::BackendError;

const TABLE: &str = "saved_locations";

#[derive(Clone)]
pub struct SavedLocations {
  backend: Arc<dyn Backend>,
  cache: CacheLayer,
  invalidator: Invalidator,
  ttl: Duration,
}

impl SavedLocations {
  pub fn new(
    backend: Arc<dyn Backend>,
    cache: CacheLayer,
    invalidator: Invalidator,
    ttl: Duration,
  ) -> Self {
    Self {
      backend,
      cache,
      invalidator,
      ttl,
    }
  }

  pub async fn get_saved_locations(
    &self,
    user_id: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<SavedLocation>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let owner = user_id.to_string();

    self
      .cache
      .fetch(
        &CacheKey::SavedLocations {
          user_id: user_id.to_string(),
        }
        .as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let owner = owner.clone();
          async move {
            let value = backend.select(TABLE, &[Filter::eq("user_id", &owner)]).await?;
            rows::<SavedLocation>(value)
          }
        },
        self.ttl,
        use_cache,
      )
      .await
  }

  pub async fn get_saved_location_by_id(
    &self,
    id: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Option<SavedLocation>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let location_id = id.to_string();

    self
      .cache
      .fetch(
        &CacheKey::SavedLocation { id: id.to_string() }.as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let location_id = location_id.clone();
          async move {
            match backend.select(TABLE, &[Filter::eq("id", &location_id)]).await {
              Ok(value) => first_row::<SavedLocation>(value),
              Err(e) if e.is_not_found() => Ok(None),
              Err(e) => Err(e),
            }
          }
        },
        self.ttl,
        use_cache,
      )
      .await
  }

  /// The user's default address, read from their cached list.
  pub async fn get_default_location(
    &self,
    user_id: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Option<SavedLocation>>, BackendError> {
    let result = self.get_saved_locations(user_id, use_cache).await?;
    Ok(result.map(|locations| locations.into_iter().find(|l| l.is_default)))
  }

  pub async fn create_saved_location(
    &self,
    location: NewSavedLocation,
  ) -> Result<SavedLocation, BackendError> {
    let cleared = location.is_default;
    if cleared {
      self.clear_defaults(&location.user_id).await?;
    }

    let outcome = async {
      let value = self.backend.insert(TABLE, serde_json::to_value(&location)?).await?;
      first_row::<SavedLocation>(value)?.ok_or_else(|| BackendError::decode("Insert returned no row"))
    }
    .await;

    // Clearing the old default is a write of its own
    if outcome.is_ok() || cleared {
      self.invalidator.after(Mutation::CreateSavedLocation).await;
    }
    outcome
  }

  pub async fn update_saved_location(
    &self,
    id: &str,
    changes: SavedLocationChanges,
  ) -> Result<SavedLocation, BackendError> {
    let value = self
      .backend
      .update(TABLE, &[Filter::eq("id", id)], serde_json::to_value(&changes)?)
      .await?;
    let updated = first_row::<SavedLocation>(value)?
      .ok_or_else(|| BackendError::not_found(format!("Saved location {} not found", id)))?;

    self.invalidator.after(Mutation::UpdateSavedLocation).await;
    Ok(updated)
  }

  pub async fn delete_saved_location(&self, id: &str) -> Result<SavedLocation, BackendError> {
    let value = self.backend.delete(TABLE, &[Filter::eq("id", id)]).await?;
    let deleted = first_row::<SavedLocation>(value)?
      .ok_or_else(|| BackendError::not_found(format!("Saved location {} not found", id)))?;

    self.invalidator.after(Mutation::DeleteSavedLocation).await;
    Ok(deleted)
  }

  /// Make `location_id` the user's only default address.
  pub async fn set_default_location(
    &self,
    user_id: &str,
    location_id: &str,
  ) -> Result<SavedLocation, BackendError> {
    let filters = [Filter::eq("id", location_id), Filter::eq("user_id", user_id)];
    let not_found = || {
      BackendError::not_found(format!("Saved location {} not found for user {}", location_id, user_id))
    };

    // Check ownership before touching the current default
    let existing = self.backend.select(TABLE, &filters).await?;
    if first_row::<SavedLocation>(existing)?.is_none() {
      return Err(not_found());
    }

    self.clear_defaults(user_id).await?;

    let outcome = async {
      let value = self
        .backend
        .update(TABLE, &filters, json!({ "is_default": true }))
        .await?;
      first_row::<SavedLocation>(value)?.ok_or_else(not_found)
    }
    .await;

    // The old default is gone either way
    self.invalidator.after(Mutation::SetDefaultLocation).await;
    outcome
  }

  async fn clear_defaults(&self, user_id: &str) -> Result<(), BackendError> {
    let filters = [Filter::eq("user_id", user_id), Filter::eq("is_default", true)];
    self
      .backend
      .update(TABLE, &filters, json!({ "is_default": false }))
      .await?;
    Ok(())
  }
}
