use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bookwell::backend::types::ResolvedLocation;

#[derive(Parser, Debug)]
#[command(name = "bookwell")]
#[command(about = "Browse services, providers and saved addresses through the offline cache")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/bookwell/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Skip cached reads and go to the network (cached data is still the fallback)
  #[arg(long, global = true)]
  pub no_cache: bool,

  /// Keep the cache in memory for this run only
  #[arg(long, global = true)]
  pub ephemeral: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List active services
  Services {
    /// Only services in this category
    #[arg(long)]
    category: Option<String>,
  },

  /// Show one service
  Service { id: String },

  /// List providers
  Providers {
    /// Only providers offering this service
    #[arg(long, conflicts_with = "near")]
    service: Option<String>,

    /// Search around LAT,LNG
    #[arg(long, value_parser = parse_coordinates)]
    near: Option<ResolvedLocation>,

    /// Search radius in kilometres, used with --near
    #[arg(long, default_value_t = 10.0, requires = "near")]
    radius: f64,
  },

  /// Show one provider
  Provider { id: String },

  /// List a user's saved addresses
  Locations { user: String },

  /// Make a saved address the user's default
  SetDefault { user: String, location: String },

  /// Drop everything cached on this device
  ClearCache,
}

/// Parse `LAT,LNG`.
fn parse_coordinates(s: &str) -> Result<ResolvedLocation, String> {
  let (lat, lng) = s
    .split_once(',')
    .ok_or_else(|| format!("expected LAT,LNG, got '{}'", s))?;

  let latitude: f64 = lat
    .trim()
    .parse()
    .map_err(|_| format!("invalid latitude '{}'", lat))?;
  let longitude: f64 = lng
    .trim()
    .parse()
    .map_err(|_| format!("invalid longitude '{}'", lng))?;

  let location = ResolvedLocation::new(latitude, longitude);
  if !location.is_valid() {
    return Err(format!("'{}' is not a valid coordinate", s));
  }
  Ok(location)
}
