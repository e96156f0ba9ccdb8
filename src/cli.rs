//! Command-line interface parsing for the tuning lookup tool
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into a validated `StartupConfig`. Connection settings can also come from
//! `ECUTUNE_*` environment variables.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::data::catalog::DEFAULT_CATALOG_URL;
use crate::data::{FallbackStore, DEFAULT_VEHICLE_TYPE};

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The catalog URL is not an http(s) URL
    #[error("Invalid catalog URL: '{0}'. Expected an http:// or https:// URL")]
    InvalidApiUrl(String),

    /// The vehicle type is blank
    #[error("Vehicle type must not be empty")]
    EmptyVehicleType,

    /// No --database was given and no default location exists
    #[error("No database path given and no home directory found; pass --database")]
    NoDatabasePath,
}

/// Vehicle tuning lookup - stock and remapped power figures
#[derive(Parser, Debug)]
#[command(name = "ecutune")]
#[command(about = "Look up stock, Stage 1 and Stage 2 power figures for a vehicle")]
#[command(version)]
pub struct Cli {
    /// Base URL of the remote tuning catalog
    #[arg(long, env = "ECUTUNE_API_URL", default_value = DEFAULT_CATALOG_URL)]
    pub api_url: String,

    /// API key for the remote catalog; without it only the local database is used
    #[arg(long, env = "ECUTUNE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Path of the local fallback database
    #[arg(long, env = "ECUTUNE_DATABASE", value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Vehicle type to look up (e.g. car, motorbike)
    #[arg(long, default_value = DEFAULT_VEHICLE_TYPE)]
    pub vehicle_type: String,

    /// Skip the remote catalog and answer from the local database only
    #[arg(long)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to look up
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List brands
    Brands,
    /// List models of a brand
    Models { brand: String },
    /// List generations of a model
    Generations { brand: String, model: String },
    /// List engines of a generation
    Engines {
        brand: String,
        model: String,
        generation: String,
    },
    /// Show tuning figures for an engine
    Tuning {
        brand: String,
        model: String,
        generation: String,
        engine: String,
    },
    /// Load vehicles from a JSON array file into the local database
    Import { file: PathBuf },
    /// Resolve JSON-lines vehicle queries read from stdin
    Batch,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    /// Catalog base URL
    pub api_url: String,
    /// Catalog key; `None` disables the remote source
    pub api_key: Option<String>,
    /// Fallback database location
    pub database: PathBuf,
    /// Vehicle type for list and tuning commands
    pub vehicle_type: String,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with validated settings
    /// * `Err(CliError)` if a setting is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let api_url = cli.api_url.trim().to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(CliError::InvalidApiUrl(cli.api_url.clone()));
        }

        let vehicle_type = cli.vehicle_type.trim().to_string();
        if vehicle_type.is_empty() {
            return Err(CliError::EmptyVehicleType);
        }

        let database = match &cli.database {
            Some(path) => path.clone(),
            None => FallbackStore::default_path().ok_or(CliError::NoDatabasePath)?,
        };

        // A blank key is the same as no key
        let api_key = cli
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !cli.offline)
            .map(str::to_string);

        Ok(StartupConfig {
            api_url,
            api_key,
            database,
            vehicle_type,
        })
    }

    /// Whether the remote catalog will be consulted
    pub fn remote_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
