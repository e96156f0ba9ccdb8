//! Tuning data endpoint: remote catalog first, local store second
//!
//! The remote resolver and the fallback store are two independent
//! implementations of `VehicleSource`. `TuningService` asks each source in
//! order and returns the first answer; results are never merged, compared or
//! copied from one source into the other.

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::catalog::CatalogError;
use super::fallback::{FallbackStore, StoreError};
use super::resolver::CascadingResolver;
use super::{TuningData, VehicleQuery};

/// Failure of a single source; always recoverable by trying the next one
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal outcome when no source could answer
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("vehicle not found: {} {} {} {}", .0.brand, .0.model, .0.generation, .0.engine)]
    NotFound(VehicleQuery),
}

/// Which dropdown list is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing<'a> {
    Brands,
    Models {
        brand: &'a str,
    },
    Generations {
        brand: &'a str,
        model: &'a str,
    },
    Engines {
        brand: &'a str,
        model: &'a str,
        generation: &'a str,
    },
}

/// A place vehicle data can be looked up
pub trait VehicleSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Names for one level of the brand → model → generation → engine tree
    fn list<'a>(
        &'a self,
        vehicle_type: &'a str,
        listing: Listing<'a>,
    ) -> BoxFuture<'a, Result<Vec<String>, SourceError>>;

    /// Tuning figures for a fully specified vehicle, `None` if unknown
    fn tuning_data<'a>(
        &'a self,
        query: &'a VehicleQuery,
    ) -> BoxFuture<'a, Result<Option<TuningData>, SourceError>>;
}

impl VehicleSource for CascadingResolver {
    fn name(&self) -> &'static str {
        "remote catalog"
    }

    // The upstream catalog is not partitioned by vehicle type.
    fn list<'a>(
        &'a self,
        _vehicle_type: &'a str,
        listing: Listing<'a>,
    ) -> BoxFuture<'a, Result<Vec<String>, SourceError>> {
        Box::pin(async move {
            let names = match listing {
                Listing::Brands => self.brands().await,
                Listing::Models { brand } => self.models(brand).await,
                Listing::Generations { brand, model } => self.generations(brand, model).await,
                Listing::Engines {
                    brand,
                    model,
                    generation,
                } => self.engines(brand, model, generation).await,
            };
            names.map_err(SourceError::from)
        })
    }

    fn tuning_data<'a>(
        &'a self,
        query: &'a VehicleQuery,
    ) -> BoxFuture<'a, Result<Option<TuningData>, SourceError>> {
        Box::pin(async move {
            self.resolve(&query.brand, &query.model, &query.generation, &query.engine)
                .await
                .map_err(SourceError::from)
        })
    }
}

impl VehicleSource for FallbackStore {
    fn name(&self) -> &'static str {
        "fallback store"
    }

    fn list<'a>(
        &'a self,
        vehicle_type: &'a str,
        listing: Listing<'a>,
    ) -> BoxFuture<'a, Result<Vec<String>, SourceError>> {
        Box::pin(async move {
            let names = match listing {
                Listing::Brands => self.brands(vehicle_type),
                Listing::Models { brand } => self.models(vehicle_type, brand),
                Listing::Generations { brand, model } => {
                    self.generations(vehicle_type, brand, model)
                }
                Listing::Engines {
                    brand,
                    model,
                    generation,
                } => self.engines(vehicle_type, brand, model, generation),
            };
            names.map_err(SourceError::from)
        })
    }

    fn tuning_data<'a>(
        &'a self,
        query: &'a VehicleQuery,
    ) -> BoxFuture<'a, Result<Option<TuningData>, SourceError>> {
        Box::pin(async move {
            self.find(query)
                .map(|row| row.map(|vehicle| vehicle.tuning_data()))
                .map_err(SourceError::from)
        })
    }
}

/// Try-chain over vehicle sources
///
/// A source "answers" with a non-empty list or a `Some` tuning result. Errors,
/// empty lists and `None` are logged and the next source is asked.
pub struct TuningService {
    sources: Vec<Box<dyn VehicleSource>>,
}

impl TuningService {
    /// Creates a service that asks `sources` in order
    pub fn new(sources: Vec<Box<dyn VehicleSource>>) -> Self {
        Self { sources }
    }

    /// The standard chain: remote catalog, then the local store
    pub fn remote_with_fallback(resolver: CascadingResolver, store: FallbackStore) -> Self {
        Self::new(vec![Box::new(resolver), Box::new(store)])
    }

    /// Names of the configured sources, in the order they are asked
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub async fn get_brands(&self, vehicle_type: &str) -> Vec<String> {
        self.list(vehicle_type, Listing::Brands).await
    }

    pub async fn get_models(&self, vehicle_type: &str, brand: &str) -> Vec<String> {
        self.list(vehicle_type, Listing::Models { brand }).await
    }

    pub async fn get_generations(&self, vehicle_type: &str, brand: &str, model: &str) -> Vec<String> {
        self.list(vehicle_type, Listing::Generations { brand, model })
            .await
    }

    pub async fn get_engines(
        &self,
        vehicle_type: &str,
        brand: &str,
        model: &str,
        generation: &str,
    ) -> Vec<String> {
        self.list(
            vehicle_type,
            Listing::Engines {
                brand,
                model,
                generation,
            },
        )
        .await
    }

    /// Resolves tuning figures from loose parameters
    pub async fn resolve_tuning_data(
        &self,
        vehicle_type: &str,
        brand: &str,
        model: &str,
        generation: &str,
        engine: &str,
    ) -> Result<TuningData, LookupError> {
        let query = VehicleQuery::new(vehicle_type, brand, model, generation, engine);
        self.get_tuning_data(&query).await
    }

    /// Resolves tuning figures, trying each source in turn
    ///
    /// Every source receives the same query. Source errors never reach the
    /// caller; when no source has the vehicle the result is
    /// `LookupError::NotFound`.
    pub async fn get_tuning_data(&self, query: &VehicleQuery) -> Result<TuningData, LookupError> {
        for (position, source) in self.sources.iter().enumerate() {
            match source.tuning_data(query).await {
                Ok(Some(data)) => {
                    if position > 0 {
                        info!(source = source.name(), brand = %query.brand, model = %query.model, "tuning data served by fallback");
                    }
                    return Ok(data);
                }
                Ok(None) => {
                    debug!(source = source.name(), engine = %query.engine, "no tuning data for engine");
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "tuning lookup failed, trying next source");
                }
            }
        }

        info!(
            vehicle_type = %query.vehicle_type,
            brand = %query.brand,
            model = %query.model,
            generation = %query.generation,
            engine = %query.engine,
            "vehicle not found in any source"
        );
        Err(LookupError::NotFound(query.clone()))
    }

    async fn list(&self, vehicle_type: &str, listing: Listing<'_>) -> Vec<String> {
        for source in &self.sources {
            match source.list(vehicle_type, listing).await {
                Ok(names) if !names.is_empty() => return names,
                Ok(_) => debug!(source = source.name(), ?listing, "empty listing"),
                Err(e) => warn!(source = source.name(), ?listing, error = %e, "listing failed, trying next source"),
            }
        }
        Vec::new()
    }
}
