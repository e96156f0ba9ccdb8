//! Vehicle tuning lookup library
//!
//! Exposes the catalog cache, the remote/fallback data layer and the CLI
//! parsing so the binary and integration tests share one implementation.

pub mod cache;
pub mod cli;
pub mod data;
