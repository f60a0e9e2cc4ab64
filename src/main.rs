mod cli;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookwell::backend::types::NearbyQuery;
use bookwell::backend::{Backend, RestBackend};
use bookwell::cache::{CacheResult, KeyValueStore, MemoryStore, NoopStore, SqliteStore, TtlCache};
use bookwell::config::{Config, LoggingConfig};
use bookwell::data::DataService;
use bookwell::error::BackendError;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Held until exit so buffered log lines are flushed
  let _guard = init_tracing(&config.logging)?;

  let store = open_store(&config, args.ephemeral)?;
  let backend: Arc<dyn Backend> = Arc::new(RestBackend::new(&config)?);
  let data = DataService::new(
    backend,
    Arc::new(TtlCache::new(store)),
    config.ttls(),
    config.retry_policy(),
    config.fallback_location,
  );

  run(&data, args.command, !args.no_cache).await
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "bookwell=info".into());

  match &logging.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;

      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
      tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
      Ok(None)
    }
  }
}

fn open_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn KeyValueStore>> {
  if !config.cache.enabled {
    return Ok(Arc::new(NoopStore));
  }
  if ephemeral {
    return Ok(Arc::new(MemoryStore::new()));
  }
  Ok(Arc::new(SqliteStore::open(config.cache.path.as_deref())?))
}

async fn run(data: &DataService, command: Command, use_cache: bool) -> Result<()> {
  match command {
    Command::Services { category } => {
      let services = match category {
        Some(category) => data.catalog().get_services_by_category(&category, use_cache).await,
        None => data.catalog().get_services(use_cache).await,
      };
      print(services)
    }
    Command::Service { id } => {
      let service = data.catalog().get_service_by_id(&id, use_cache).await;
      print(service)
    }
    Command::Providers {
      service,
      near,
      radius,
    } => {
      let providers = match (service, near) {
        (Some(service_id), _) => {
          data
            .providers()
            .get_providers_for_service(&service_id, use_cache)
            .await
        }
        (None, Some(origin)) => {
          let query = NearbyQuery {
            latitude: origin.latitude,
            longitude: origin.longitude,
            radius_km: radius,
          };
          data.providers().get_nearby_providers(query, use_cache).await
        }
        (None, None) => data.providers().get_providers(use_cache).await,
      };
      print(providers)
    }
    Command::Provider { id } => {
      let provider = data.providers().get_provider_by_id(&id, use_cache).await;
      print(provider)
    }
    Command::Locations { user } => {
      let locations = data.locations().get_saved_locations(&user, use_cache).await;
      print(locations)
    }
    Command::SetDefault { user, location } => {
      let chosen = data
        .locations()
        .set_default_location(&user, &location)
        .await
        .map(CacheResult::from_network);
      print(chosen)
    }
    Command::ClearCache => {
      data.sign_out().await;
      eprintln!("Cache cleared");
      Ok(())
    }
  }
}

/// Print the data as JSON, noting on stderr when it is a cached fallback.
fn print<T: Serialize>(result: Result<CacheResult<T>, BackendError>) -> Result<()> {
  let result = result.map_err(|e| eyre!("{}\n{}", e.user_message(), e))?;

  if result.is_stale() {
    match result.expires_at {
      Some(expires_at) => eprintln!(
        "Showing saved data (offline), valid until {}",
        expires_at.format("%Y-%m-%d %H:%M UTC")
      ),
      None => eprintln!("Showing saved data (offline)"),
    }
  }

  println!("{}", serde_json::to_string_pretty(&result.data)?);
  Ok(())
}
