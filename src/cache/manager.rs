//! Time-boxed cache for catalog responses
//!
//! Provides a `TtlCache` that stores serializable payloads under a `CacheKey`
//! together with the time they were captured. Reads past the TTL behave
//! exactly like reads of a key that was never written.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::clock::{Clock, SystemClock};

/// Deterministic signature of a cached operation
///
/// Built from the operation name and its ordered arguments, lower-cased so
/// that `"Audi"` and `"audi"` share an entry. Distinct operations never
/// collide because the operation name is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key for `operation` called with `args`
    ///
    /// # Example
    ///
    /// ```
    /// use ecutune::cache::CacheKey;
    ///
    /// let key = CacheKey::new("models", &["42"]);
    /// assert_eq!(key.as_str(), "models(42)");
    /// ```
    pub fn new(operation: &str, args: &[&str]) -> Self {
        let args = args
            .iter()
            .map(|arg| arg.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join("|");
        Self(format!("{}({})", operation.to_lowercase(), args))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached payload and the moment it was fetched
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The cached payload, stored as JSON so any fetch result fits
    data: serde_json::Value,
    /// When the payload was stored
    captured_at: DateTime<Utc>,
}

/// In-memory cache with a fixed time-to-live
///
/// There is no size bound and no eviction: stale entries stay in the map until
/// the next successful `put` for the same key replaces them. The lock is held
/// only for the map access itself, never across an upstream fetch, so two
/// callers missing the same cold key may both fetch it. Both writes carry the
/// same immutable result, so the second one is harmless.
#[derive(Debug)]
pub struct TtlCache {
    /// Entries keyed by operation signature
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// How long an entry is trusted after capture
    ttl: Duration,
    /// Time source used for capture and expiry
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    /// Creates an empty cache using the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Creates an empty cache with a custom time source
    ///
    /// Useful for testing expiry without sleeping.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Returns the configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads a fresh entry from the cache
    ///
    /// Returns `None` if the key was never written, if the entry is older than
    /// the TTL, or if the stored payload does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;

        if self.clock.now() - entry.captured_at > self.ttl {
            debug!(key = %key, "cache entry expired");
            return None;
        }

        serde_json::from_value(entry.data.clone()).ok()
    }

    /// Stores `data` under `key`, stamped with the current time
    ///
    /// Overwrites any existing entry for the key, fresh or stale.
    pub fn put<T: Serialize>(&self, key: CacheKey, data: &T) -> Result<(), serde_json::Error> {
        let entry = CacheEntry {
            data: serde_json::to_value(data)?,
            captured_at: self.clock.now(),
        };

        debug!(key = %key, "cache entry stored");
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
        Ok(())
    }

    /// Number of entries held, stale ones included
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
