use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::types::ResolvedLocation;
use crate::location::DEFAULT_FALLBACK;
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  /// Coordinates used for providers with no known location
  #[serde(default = "default_fallback_location")]
  pub fallback_location: ResolvedLocation,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://xyz.example.co
  pub url: String,
  /// Public API key sent with every request
  pub anon_key: String,
  #[serde(default = "default_request_timeout")]
  pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to send every read to the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Cache database path (default: $XDG_DATA_HOME/bookwell/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default)]
  pub ttl_hours: TtlHours,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      ttl_hours: TtlHours::default(),
    }
  }
}

/// Per-module time-to-live, in hours
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TtlHours {
  pub services: i64,
  pub providers: i64,
  pub nearby: i64,
  pub locations: i64,
}

impl Default for TtlHours {
  fn default() -> Self {
    Self {
      services: 24,
      providers: 6,
      nearby: 4,
      locations: 12,
    }
  }
}

impl TtlHours {
  /// Longest TTL accepted, one year.
  pub const MAX: i64 = 24 * 365;

  fn validate(&self) -> Result<()> {
    let fields = [
      ("services", self.services),
      ("providers", self.providers),
      ("nearby", self.nearby),
      ("locations", self.locations),
    ];
    for (name, hours) in fields {
      if !(1..=Self::MAX).contains(&hours) {
        return Err(eyre!(
          "cache.ttl_hours.{} must be between 1 and {}, got {}",
          name,
          Self::MAX,
          hours
        ));
      }
    }
    Ok(())
  }
}

/// TTLs as durations, handed to the data modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
  pub services: Duration,
  pub providers: Duration,
  pub nearby: Duration,
  pub locations: Duration,
}

impl From<TtlHours> for CacheTtls {
  fn from(h: TtlHours) -> Self {
    Self {
      services: Duration::hours(h.services),
      providers: Duration::hours(h.providers),
      nearby: Duration::hours(h.nearby),
      locations: Duration::hours(h.locations),
    }
  }
}

impl Default for CacheTtls {
  fn default() -> Self {
    TtlHours::default().into()
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      base_delay_ms: DEFAULT_BASE_DELAY_MS,
    }
  }
}

impl From<RetryConfig> for RetryPolicy {
  fn from(c: RetryConfig) -> Self {
    RetryPolicy::new(c.max_attempts, std::time::Duration::from_millis(c.base_delay_ms))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// Write logs to this file (rotated daily) instead of stderr
  pub file: Option<PathBuf>,
}

fn default_true() -> bool {
  true
}

fn default_request_timeout() -> u64 {
  30
}

fn default_fallback_location() -> ResolvedLocation {
  DEFAULT_FALLBACK
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./bookwell.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/bookwell/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/bookwell/config.yaml\n\
                 with at least a backend url and anon_key."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("bookwell.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("bookwell").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if !config.fallback_location.is_valid() {
      return Err(eyre!("fallback_location is not a valid coordinate"));
    }
    config.cache.ttl_hours.validate()?;

    Ok(config)
  }

  /// Token for the signed-in user.
  ///
  /// Checks BOOKWELL_ACCESS_TOKEN, falling back to the anon key for public reads.
  pub fn access_token(&self) -> String {
    std::env::var("BOOKWELL_ACCESS_TOKEN").unwrap_or_else(|_| self.backend.anon_key.clone())
  }

  pub fn ttls(&self) -> CacheTtls {
    self.cache.ttl_hours.into()
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    self.retry.into()
  }
}
