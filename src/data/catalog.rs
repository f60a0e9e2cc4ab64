//! Service catalog reads and writes.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::api_types::{first_row, rows};
use crate::backend::types::{NewService, Service, ServiceChanges};
use crate::backend::{Backend, Filter};
use crate::cache::{CacheKey, CacheLayer, CacheResult, Invalidator, Mutation};
use crate::error::BackendError;

const TABLE: &str = "services";

#[derive(Clone)]
pub struct Catalog {
  backend: Arc<dyn Backend>,
  cache: CacheLayer,
  invalidator: Invalidator,
  ttl: Duration,
  /// Services seen this session, by id, with the expiry of the read they came from
  by_id: Arc<Mutex<HashMap<String, (Service, DateTime<Utc>)>>>,
}

impl Catalog {
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
      by_id: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// All active services.
  pub async fn get_services(&self, use_cache: bool) -> Result<CacheResult<Vec<Service>>, BackendError> {
    let backend = Arc::clone(&self.backend);
    let result = self
      .cache
      .fetch(
        &CacheKey::Services.as_key(),
        move || {
          let backend = Arc::clone(&backend);
          async move {
            let value = backend.select(TABLE, &[Filter::eq("active", true)]).await?;
            rows::<Service>(value)
          }
        },
        self.ttl,
        use_cache,
      )
      .await?;

    self.remember(&result.data, self.expiry_of(&result));
    Ok(result)
  }

  /// Active services in one category.
  pub async fn get_services_by_category(
    &self,
    category: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Vec<Service>>, BackendError> {
    let result = self.get_services(use_cache).await?;
    Ok(result.map(|services| {
      services
        .into_iter()
        .filter(|s| s.category.eq_ignore_ascii_case(category))
        .collect()
    }))
  }

  /// One service, or `None` if it doesn't exist.
  pub async fn get_service_by_id(
    &self,
    id: &str,
    use_cache: bool,
  ) -> Result<CacheResult<Option<Service>>, BackendError> {
    if use_cache {
      if let Some(service) = self.remembered(id) {
        return Ok(CacheResult::from_memory(Some(service)));
      }
    }

    let backend = Arc::clone(&self.backend);
    let service_id = id.to_string();
    let result = self
      .cache
      .fetch(
        &CacheKey::Service { id: id.to_string() }.as_key(),
        move || {
          let backend = Arc::clone(&backend);
          let service_id = service_id.clone();
          async move {
            match backend.select(TABLE, &[Filter::eq("id", &service_id)]).await {
              Ok(value) => first_row::<Service>(value),
              Err(e) if e.is_not_found() => Ok(None),
              Err(e) => Err(e),
            }
          }
        },
        self.ttl,
        use_cache,
      )
      .await?;

    if let Some(service) = &result.data {
      self.remember(std::slice::from_ref(service), self.expiry_of(&result));
    }
    Ok(result)
  }

  pub async fn create_service(&self, service: NewService) -> Result<Service, BackendError> {
    let value = self.backend.insert(TABLE, serde_json::to_value(&service)?).await?;
    let created = first_row::<Service>(value)?
      .ok_or_else(|| BackendError::decode("Insert returned no row"))?;

    self.after_write(Mutation::CreateService).await;
    Ok(created)
  }

  pub async fn update_service(&self, id: &str, changes: ServiceChanges) -> Result<Service, BackendError> {
    let value = self
      .backend
      .update(TABLE, &[Filter::eq("id", id)], serde_json::to_value(&changes)?)
      .await?;
    let updated = first_row::<Service>(value)?
      .ok_or_else(|| BackendError::not_found(format!("Service {} not found", id)))?;

    self.after_write(Mutation::UpdateService).await;
    Ok(updated)
  }

  pub async fn delete_service(&self, id: &str) -> Result<Service, BackendError> {
    let value = self.backend.delete(TABLE, &[Filter::eq("id", id)]).await?;
    let deleted = first_row::<Service>(value)?
      .ok_or_else(|| BackendError::not_found(format!("Service {} not found", id)))?;

    self.after_write(Mutation::DeleteService).await;
    Ok(deleted)
  }

  /// Drop everything remembered this session.
  pub fn forget(&self) {
    if let Ok(mut by_id) = self.by_id.lock() {
      by_id.clear();
    }
  }

  async fn after_write(&self, mutation: Mutation) {
    self.invalidator.after(mutation).await;
    self.forget();
  }

  /// Memo entries live no longer than the cache entry they mirror.
  fn expiry_of<T>(&self, result: &CacheResult<T>) -> DateTime<Utc> {
    result
      .expires_at
      .unwrap_or_else(|| self.cache.cache().now() + self.ttl)
  }

  fn remember(&self, services: &[Service], expiry: DateTime<Utc>) {
    if let Ok(mut by_id) = self.by_id.lock() {
      for service in services {
        by_id.insert(service.id.clone(), (service.clone(), expiry));
      }
    }
  }

  fn remembered(&self, id: &str) -> Option<Service> {
    let now = self.cache.cache().now();
    let mut by_id = self.by_id.lock().ok()?;

    let (service, expiry) = by_id.get(id)?.clone();
    if now <= expiry {
      return Some(service);
    }
    by_id.remove(id);
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::mock::MockBackend;
  use crate::cache::{CacheSource, ManualClock, MemoryStore, TtlCache};
  use crate::retry::RetryPolicy;
  use chrono::TimeZone;
  use serde_json::json;

  fn setup(backend: MockBackend) -> (Catalog, Arc<MockBackend>) {
    let (catalog, backend, _clock) = setup_with_clock(backend);
    (catalog, backend)
  }

  fn setup_with_clock(backend: MockBackend) -> (Catalog, Arc<MockBackend>, Arc<ManualClock>) {
    let backend = Arc::new(backend);
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()));
    let cache = Arc::new(TtlCache::with_clock(Arc::new(MemoryStore::new()), clock.clone()));
    let layer = CacheLayer::new(cache, RetryPolicy::default());
    let catalog = Catalog::new(
      backend.clone(),
      layer.clone(),
      Invalidator::new(&layer),
      Duration::hours(24),
    );
    (catalog, backend, clock)
  }

  fn seeded() -> MockBackend {
    MockBackend::new().with_rows(
      TABLE,
      vec![
        json!({"id": "s1", "name": "Deep clean", "category": "Cleaning", "base_price": 60.0, "active": true}),
        json!({"id": "s2", "name": "Leak repair", "category": "Plumbing", "base_price": 80.0, "active": true}),
        json!({"id": "s3", "name": "Retired", "category": "Cleaning", "base_price": 10.0, "active": false}),
      ],
    )
  }

  #[tokio::test]
  async fn test_services_are_cached() {
    let (catalog, backend) = setup(seeded());

    let first = catalog.get_services(true).await.unwrap();
    let second = catalog.get_services(true).await.unwrap();

    assert_eq!(first.data.len(), 2);
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(backend.call_count("select:services"), 1);
  }

  #[tokio::test]
  async fn test_by_category() {
    let (catalog, _backend) = setup(seeded());

    let cleaning = catalog.get_services_by_category("cleaning", true).await.unwrap();
    assert_eq!(cleaning.data.len(), 1);
    assert_eq!(cleaning.data[0].id, "s1");
  }

  #[tokio::test]
  async fn test_lookup_by_id_uses_session_memory() {
    let (catalog, backend) = setup(seeded());

    catalog.get_services(true).await.unwrap();
    let service = catalog.get_service_by_id("s2", true).await.unwrap();

    assert_eq!(service.data.map(|s| s.name), Some("Leak repair".to_string()));
    assert_eq!(service.source, CacheSource::Memory);
    assert_eq!(backend.call_count("select:services"), 1);
  }

  #[tokio::test]
  async fn test_session_memory_expires_with_cache() {
    let (catalog, backend, clock) = setup_with_clock(seeded());

    catalog.get_services(true).await.unwrap();
    clock.advance(Duration::hours(23));
    let fresh = catalog.get_service_by_id("s1", true).await.unwrap();
    assert_eq!(fresh.source, CacheSource::Memory);

    clock.advance(Duration::hours(2));
    let service = catalog.get_service_by_id("s1", true).await.unwrap();

    assert_eq!(service.source, CacheSource::Network);
    assert_eq!(service.data.map(|s| s.id), Some("s1".to_string()));
    assert_eq!(backend.call_count("select:services"), 2);
  }

  #[tokio::test]
  async fn test_missing_service_is_none() {
    let (catalog, _backend) = setup(seeded());

    let service = catalog.get_service_by_id("nope", true).await.unwrap();
    assert_eq!(service.data, None);
  }

  #[tokio::test]
  async fn test_update_invalidates_catalog() {
    let (catalog, backend) = setup(seeded());

    let before = catalog.get_services(true).await.unwrap();
    assert_eq!(before.data[0].base_price, 60.0);

    let changes = ServiceChanges {
      base_price: Some(75.0),
      ..Default::default()
    };
    let updated = catalog.update_service("s1", changes).await.unwrap();
    assert_eq!(updated.base_price, 75.0);

    let after = catalog.get_services(true).await.unwrap();
    assert_eq!(after.source, CacheSource::Network);
    assert_eq!(after.data[0].base_price, 75.0);
    assert_eq!(backend.call_count("select:services"), 2);

    let by_id = catalog.get_service_by_id("s1", true).await.unwrap();
    assert_eq!(by_id.data.unwrap().base_price, 75.0);
  }

  #[tokio::test]
  async fn test_create_and_delete() {
    let (catalog, _backend) = setup(seeded());
    catalog.get_services(true).await.unwrap();

    let created = catalog
      .create_service(NewService {
        name: "Window wash".into(),
        category: "Cleaning".into(),
        description: None,
        base_price: 30.0,
        duration_minutes: Some(45),
        active: true,
      })
      .await
      .unwrap();
    assert_eq!(catalog.get_services(true).await.unwrap().data.len(), 3);

    catalog.delete_service(&created.id).await.unwrap();
    assert_eq!(catalog.get_services(true).await.unwrap().data.len(), 2);
  }

  #[tokio::test]
  async fn test_update_missing_service_is_not_found() {
    let (catalog, _backend) = setup(seeded());

    let err = catalog
      .update_service("nope", ServiceChanges::default())
      .await
      .unwrap_err();
    assert!(err.is_not_found());
  }

  #[tokio::test]
  async fn test_permission_denied_is_not_retried() {
    let (catalog, backend) = setup(seeded());
    backend.fail(TABLE, BackendError::from_code("42501", "permission denied"), 5);

    let err = catalog.get_services(true).await.unwrap_err();

    assert_eq!(err.code.as_deref(), Some("42501"));
    assert_eq!(backend.call_count("select:services"), 1);
  }
}
