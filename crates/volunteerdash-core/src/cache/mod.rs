//! Local caching module for offline data access.
//!
//! This module provides the `ResponseCache` for storing raw Galaxy Digital
//! API responses locally. Entries are JSON documents keyed by a hash of the
//! endpoint and normalized query parameters, and are considered stale after
//! a configurable number of days (7 by default).
//!
//! Storage is pluggable through the `Store` trait:
//! - `FileStore`: one `<key>.json` file per entry
//! - `MemoryStore`: process-local map
//! - `LayeredStore`: memory map in front of another store

pub mod key;
pub mod manager;
pub mod store;

pub use key::{cache_key, params, stringify_value, Params};
pub use manager::{CacheEntry, CacheStats, ResponseCache, DEFAULT_MAX_AGE_DAYS};
pub use store::{FileStore, LayeredStore, MemoryStore, Store};
