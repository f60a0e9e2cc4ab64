use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::BackendError;

use super::{Backend, Filter};

/// PostgREST-style HTTP client for the hosted backend
#[derive(Clone)]
pub struct RestBackend {
  http: reqwest::Client,
  rest_url: Url,
  api_key: String,
  access_token: String,
}

impl RestBackend {
  pub fn new(config: &Config) -> Result<Self> {
    let base = config.backend.url.trim_end_matches('/');
    let rest_url = Url::parse(&format!("{}/rest/v1/", base))
      .map_err(|e| eyre!("Invalid backend url {}: {}", config.backend.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.backend.request_timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      rest_url,
      api_key: config.backend.anon_key.clone(),
      access_token: config.access_token(),
    })
  }

  fn url(&self, path: &str) -> Result<Url, BackendError> {
    self
      .rest_url
      .join(path)
      .map_err(|e| BackendError::decode(format!("Invalid endpoint {}: {}", path, e)))
  }

  fn request(&self, method: Method, path: &str, filters: &[Filter]) -> Result<RequestBuilder, BackendError> {
    let pairs: Vec<(String, String)> = filters.iter().map(Filter::to_query_pair).collect();

    Ok(
      self
        .http
        .request(method, self.url(path)?)
        .query(&pairs)
        .header("apikey", &self.api_key)
        .bearer_auth(&self.access_token),
    )
  }

  async fn send(&self, request: RequestBuilder) -> Result<Value, BackendError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      return Err(BackendError::from_response(status.as_u16(), &body));
    }

    if body.trim().is_empty() {
      return Ok(Value::Array(Vec::new()));
    }

    Ok(serde_json::from_str(&body)?)
  }
}

#[async_trait]
impl Backend for RestBackend {
  async fn select(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError> {
    let request = self
      .request(Method::GET, table, filters)?
      .query(&[("select", "*")]);
    self.send(request).await
  }

  async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
    let request = self
      .request(Method::POST, &format!("rpc/{}", function), &[])?
      .json(&args);
    self.send(request).await
  }

  async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
    let request = self
      .request(Method::POST, table, &[])?
      .header("Prefer", "return=representation")
      .json(&row);
    self.send(request).await
  }

  async fn update(
    &self,
    table: &str,
    filters: &[Filter],
    changes: Value,
  ) -> Result<Value, BackendError> {
    let request = self
      .request(Method::PATCH, table, filters)?
      .header("Prefer", "return=representation")
      .json(&changes);
    self.send(request).await
  }

  async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError> {
    let request = self
      .request(Method::DELETE, table, filters)?
      .header("Prefer", "return=representation");
    self.send(request).await
  }
}
