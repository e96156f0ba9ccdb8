//! Remote chiptuning catalog client
//!
//! Fetches brands, models, years and per-year stage records from the external
//! tuning catalog. Every fetch goes through the shared `TtlCache`, keyed by
//! the resource and the upstream id it was requested for.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheKey, TtlCache};

/// Default base URL of the upstream catalog API
pub const DEFAULT_CATALOG_URL: &str = "https://api.tuning-catalog.com/v1";

/// Time-to-live for cached catalog responses in minutes
pub const CATALOG_CACHE_TTL_MINUTES: i64 = 10;

/// Errors that can occur while resolving data from the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Transport-level failure talking to the catalog
    #[error("network error while contacting the tuning catalog")]
    Network(#[from] reqwest::Error),

    /// The catalog answered with a non-2xx status
    #[error("tuning catalog returned HTTP {0}")]
    Status(u16),

    /// The response body was not in a recognised shape
    #[error("failed to parse catalog response: {0}")]
    Parse(String),

    /// The brand listing contained no usable entries
    #[error("no valid brand data")]
    NoValidBrands,

    #[error("Brand \"{brand}\" not found")]
    BrandNotFound { brand: String },

    #[error("Model \"{model}\" not found for brand \"{brand}\"")]
    ModelNotFound { brand: String, model: String },

    #[error("Year \"{generation}\" not found for {brand} {model}")]
    YearNotFound {
        brand: String,
        model: String,
        generation: String,
    },
}

/// Display name of an upstream record
///
/// The catalog is inconsistent about where it puts a record's label: some
/// records use `name`, others `var_title`. Every record type embeds this
/// struct so the "first non-empty field wins" rule lives in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityName {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub var_title: Option<String>,
}

impl EntityName {
    /// Returns the first of `name` / `var_title` that is non-blank
    pub fn display(&self) -> Option<&str> {
        [self.name.as_deref(), self.var_title.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }

    /// Case-insensitive comparison against the display name
    pub fn matches_ignore_case(&self, wanted: &str) -> bool {
        self.display()
            .is_some_and(|name| name.to_lowercase() == wanted.to_lowercase())
    }

    /// Exact comparison against the display name
    pub fn matches_exact(&self, wanted: &str) -> bool {
        self.display() == Some(wanted)
    }
}

/// A brand, model or year from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntity {
    /// Upstream identifier
    pub id: u64,
    #[serde(flatten)]
    pub label: EntityName,
    /// Id of the record one level up; brands have none
    #[serde(default)]
    pub parent_id: Option<u64>,
}

impl CatalogEntity {
    pub fn display_name(&self) -> Option<&str> {
        self.label.display()
    }
}

/// Engine power figures attached to a stage record
///
/// The snapshot's own display name is the engine label (e.g. "2.0 TDI").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    #[serde(flatten)]
    pub label: EntityName,
    /// Stock horsepower
    #[serde(default)]
    pub int_hp: Option<u32>,
    /// Stock torque
    #[serde(default)]
    pub int_nm: Option<u32>,
    /// Horsepower after this stage
    #[serde(default)]
    pub int_hp_new: Option<u32>,
    /// Torque after this stage
    #[serde(default)]
    pub int_nm_new: Option<u32>,
}

/// One tuning stage for one engine of a model year
///
/// The stage's own display name is its classification token ("ECO",
/// "Stage 1", "Stage 2", ...). Records without a parent snapshot are dropped
/// when the stage list is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: u64,
    #[serde(flatten)]
    pub label: EntityName,
    #[serde(default)]
    pub parent: Option<PowerSnapshot>,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

impl StageRecord {
    /// Classification token of this stage
    pub fn title(&self) -> Option<&str> {
        self.label.display()
    }

    /// Engine label from the parent snapshot
    pub fn engine(&self) -> Option<&str> {
        self.parent.as_ref().and_then(|p| p.label.display())
    }
}

/// Client for the remote tuning catalog
#[derive(Debug, Clone)]
pub struct CatalogClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    /// Key sent with every request
    api_key: String,
    /// Shared response cache
    cache: Arc<TtlCache>,
}

impl CatalogClient {
    /// Creates a client with its own cache using the standard TTL
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let cache = TtlCache::new(Duration::minutes(CATALOG_CACHE_TTL_MINUTES));
        Self::with_cache(base_url, api_key, Arc::new(cache))
    }

    /// Creates a client that uses the given cache
    pub fn with_cache(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        cache: Arc<TtlCache>,
    ) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            cache,
        }
    }

    /// The cache backing this client
    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Fetches all brands
    ///
    /// Accepts a bare array, `{"data": [...]}` or `{"brands": [...]}`; the
    /// first of those that yields at least one named brand is used.
    pub async fn fetch_brands(&self) -> Result<Vec<CatalogEntity>, CatalogError> {
        let key = CacheKey::new("brands", &[]);
        self.cached(key, async {
            let body = self.get_json("brands", &[]).await?;
            parse_brands(&body)
        })
        .await
    }

    /// Fetches the models of a brand
    pub async fn fetch_models(&self, brand_id: u64) -> Result<Vec<CatalogEntity>, CatalogError> {
        let id = brand_id.to_string();
        let key = CacheKey::new("models", &[id.as_str()]);
        self.cached(key, async {
            let body = self.get_json("models", &[("brand_id", id.as_str())]).await?;
            parse_named_list(&body, "models", brand_id)
        })
        .await
    }

    /// Fetches the years (generations) of a model
    pub async fn fetch_years(&self, model_id: u64) -> Result<Vec<CatalogEntity>, CatalogError> {
        let id = model_id.to_string();
        let key = CacheKey::new("years", &[id.as_str()]);
        self.cached(key, async {
            let body = self.get_json("years", &[("model_id", id.as_str())]).await?;
            parse_named_list(&body, "years", model_id)
        })
        .await
    }

    /// Fetches the stage records of a model year
    pub async fn fetch_stages(&self, year_id: u64) -> Result<Vec<StageRecord>, CatalogError> {
        let id = year_id.to_string();
        let key = CacheKey::new("stages", &[id.as_str()]);
        self.cached(key, async {
            let body = self.get_json("stages", &[("year_id", id.as_str())]).await?;
            parse_stages(&body, year_id)
        })
        .await
    }

    /// Serves `key` from the cache, or runs `fetch` and stores its result
    ///
    /// Failures are returned as-is and never cached.
    async fn cached<T, F>(&self, key: CacheKey, fetch: F) -> Result<T, CatalogError>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, CatalogError>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key) {
            debug!(key = %key, "catalog cache hit");
            return Ok(hit);
        }

        debug!(key = %key, "catalog cache miss");
        let value = fetch.await?;
        if let Err(e) = self.cache.put(key, &value) {
            warn!(error = %e, "failed to cache catalog response");
        }
        Ok(value)
    }

    /// Issues a GET for `resource` and decodes the body as JSON
    async fn get_json(&self, resource: &str, params: &[(&str, &str)]) -> Result<Value, CatalogError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), resource);
        debug!(resource, ?params, "catalog request");

        let response = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

/// Decodes every element that parses as `T`, skipping the rest
fn decode_each<T: DeserializeOwned>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

/// Keeps only the entities that have a usable display name
fn named_entities(items: &[Value]) -> Vec<CatalogEntity> {
    decode_each::<CatalogEntity>(items)
        .into_iter()
        .filter(|entity| entity.display_name().is_some())
        .collect()
}

/// Picks the brand list out of whichever envelope the catalog used
fn parse_brands(body: &Value) -> Result<Vec<CatalogEntity>, CatalogError> {
    let envelopes = [Some(body), body.get("data"), body.get("brands")];

    envelopes
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .map(|items| named_entities(items))
        .find(|brands| !brands.is_empty())
        .ok_or(CatalogError::NoValidBrands)
}

fn parse_named_list(
    body: &Value,
    resource: &str,
    parent_id: u64,
) -> Result<Vec<CatalogEntity>, CatalogError> {
    let items = body
        .as_array()
        .ok_or_else(|| CatalogError::Parse(format!("expected an array of {}", resource)))?;

    Ok(named_entities(items)
        .into_iter()
        .map(|entity| CatalogEntity {
            parent_id: Some(parent_id),
            ..entity
        })
        .collect())
}

fn parse_stages(body: &Value, year_id: u64) -> Result<Vec<StageRecord>, CatalogError> {
    let items = body
        .as_array()
        .ok_or_else(|| CatalogError::Parse("expected an array of stages".to_string()))?;

    Ok(decode_each::<StageRecord>(items)
        .into_iter()
        .filter(|stage| stage.parent.is_some())
        .map(|stage| StageRecord {
            parent_id: Some(year_id),
            ..stage
        })
        .collect())
}
