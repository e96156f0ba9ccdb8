//! ecutune - look up stock and remapped power figures for a vehicle
//!
//! Resolves brands, models, generations, engines and tuning figures against
//! the remote tuning catalog, falling back to a local SQLite database when the
//! catalog cannot answer. Results are printed to stdout as JSON.

use std::fs;
use std::process;

use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecutune::cli::{Cli, Command, StartupConfig};
use ecutune::data::{
    CascadingResolver, CatalogClient, FallbackStore, FallbackVehicle, TuningService,
    VehicleQuery, VehicleSource,
};

/// Exit status when no source knows the vehicle
const NOT_FOUND_EXIT_CODE: i32 = 2;

/// Installs the tracing subscriber; `RUST_LOG` overrides the default level
fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Builds the source chain: remote catalog (if configured), then the store
fn build_service(config: &StartupConfig, store: FallbackStore) -> TuningService {
    let mut sources: Vec<Box<dyn VehicleSource>> = Vec::new();
    if let Some(api_key) = &config.api_key {
        let client = CatalogClient::new(config.api_url.clone(), api_key.clone());
        sources.push(Box::new(CascadingResolver::new(client)));
    }
    sources.push(Box::new(store));
    TuningService::new(sources)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves one JSON query per stdin line, writing one JSON result per line
///
/// Blank lines are skipped. All lines share the same service, so repeated
/// lookups for the same vehicle are served from the catalog cache.
async fn run_batch(service: &TuningService) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<VehicleQuery>(&line) {
            Ok(query) => match service.get_tuning_data(&query).await {
                Ok(data) => json!({ "query": query, "tuning": data }),
                Err(e) => json!({ "query": query, "error": e.to_string() }),
            },
            Err(e) => json!({ "error": format!("invalid query: {}", e) }),
        };

        stdout.write_all(format!("{}\n", output).as_bytes()).await?;
    }

    stdout.flush().await
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = StartupConfig::from_cli(&cli)?;
    let store = FallbackStore::open(&config.database)?;

    if let Command::Import { file } = &cli.command {
        let vehicles: Vec<FallbackVehicle> = serde_json::from_str(&fs::read_to_string(file)?)?;
        let imported = store.insert_all(&vehicles)?;
        info!(imported, database = %config.database.display(), "vehicles imported");
        print_json(&json!({ "imported": imported }))?;
        return Ok(());
    }

    info!(
        remote = config.remote_enabled(),
        database = %config.database.display(),
        "starting lookup"
    );
    let service = build_service(&config, store);
    let vehicle_type = config.vehicle_type.as_str();

    match cli.command {
        Command::Brands => print_json(&service.get_brands(vehicle_type).await)?,
        Command::Models { brand } => print_json(&service.get_models(vehicle_type, &brand).await)?,
        Command::Generations { brand, model } => {
            print_json(&service.get_generations(vehicle_type, &brand, &model).await)?
        }
        Command::Engines {
            brand,
            model,
            generation,
        } => print_json(
            &service
                .get_engines(vehicle_type, &brand, &model, &generation)
                .await,
        )?,
        Command::Tuning {
            brand,
            model,
            generation,
            engine,
        } => {
            match service
                .resolve_tuning_data(vehicle_type, &brand, &model, &generation, &engine)
                .await
            {
                Ok(data) => print_json(&data)?,
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(NOT_FOUND_EXIT_CODE);
                }
            }
        }
        Command::Batch => run_batch(&service).await?,
        Command::Import { .. } => {}
    }

    Ok(())
}
