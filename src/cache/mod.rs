//! In-memory cache for upstream catalog responses
//!
//! This module provides a time-boxed cache that holds fetched catalog payloads
//! for a fixed time-to-live (TTL). Expired entries read as absent and are
//! overwritten in place by the next successful fetch. Nothing is persisted
//! across restarts.

mod clock;
mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{CacheKey, TtlCache};
