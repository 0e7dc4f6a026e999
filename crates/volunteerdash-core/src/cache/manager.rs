use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::key::{cache_key, Params};
use super::store::{FileStore, LayeredStore, Store};
use crate::utils::age_display;

/// Default staleness window for API responses.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// A cached API response as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub endpoint: String,
    pub params: Params,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(endpoint: &str, params: &Params, data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            params: params.clone(),
            data,
            timestamp,
        }
    }

    /// The key this entry is stored under.
    pub fn key(&self) -> String {
        cache_key(&self.endpoint, &self.params)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > max_age
    }
}

/// Aggregate statistics over every cached response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Human-readable age of the newest entry, or "never"
    pub fn last_updated(&self, now: DateTime<Utc>) -> String {
        self.newest_timestamp
            .map(|ts| age_display(now - ts))
            .unwrap_or_else(|| "never".to_string())
    }
}

/// Time-limited cache of API responses keyed by (endpoint, params).
///
/// Clone is cheap; clones share the same store.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn Store>,
    max_age: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn Store>, max_age_days: i64) -> Self {
        Self {
            store,
            max_age: Duration::days(max_age_days),
        }
    }

    /// File-backed cache rooted at `dir`, with an in-memory layer in front.
    pub fn open(dir: &Path, max_age_days: i64) -> Result<Self> {
        let store = FileStore::new(dir)?;
        info!(dir = %dir.display(), max_age_days, "API response cache enabled");
        Ok(Self::new(Arc::new(LayeredStore::new(Arc::new(store))), max_age_days))
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Cached payload for a request, if present and fresh.
    pub fn get(&self, endpoint: &str, params: &Params) -> Option<Value> {
        self.get_at(endpoint, params, Utc::now())
    }

    /// [`get`](Self::get) evaluated against an explicit clock.
    pub fn get_at(&self, endpoint: &str, params: &Params, now: DateTime<Utc>) -> Option<Value> {
        let key = cache_key(endpoint, params);
        let entry = self.load_entry(&key)?;

        if entry.is_stale(self.max_age, now) {
            info!(
                endpoint,
                age = %age_display(entry.age(now)),
                max_age_days = self.max_age.num_days(),
                "Cache expired"
            );
            return None;
        }

        info!(endpoint, age = %age_display(entry.age(now)), "Cache hit");
        Some(entry.data)
    }

    /// Store a payload. Failures are logged, never propagated.
    pub fn put(&self, endpoint: &str, params: &Params, data: &Value) {
        self.put_entry(&CacheEntry::new(endpoint, params, data.clone(), Utc::now()));
    }

    pub fn put_entry(&self, entry: &CacheEntry) {
        let key = entry.key();
        let result = serde_json::to_string_pretty(entry)
            .map_err(anyhow::Error::from)
            .and_then(|contents| self.store.write(&key, &contents));
        match result {
            Ok(()) => debug!(endpoint = %entry.endpoint, key = %key, "Saved response to cache"),
            Err(e) => warn!(endpoint = %entry.endpoint, error = %e, "Failed to save response to cache"),
        }
    }

    /// Load and parse an entry, treating unreadable or corrupt data as absent.
    fn load_entry(&self, key: &str) -> Option<CacheEntry> {
        let contents = match self.store.read(key) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Remove cached entries, optionally only those older than `older_than_days`.
    ///
    /// Entries that cannot be parsed are always removed. Returns the number
    /// of entries deleted.
    pub fn clear(&self, older_than_days: Option<i64>) -> Result<usize> {
        self.clear_at(older_than_days, Utc::now())
    }

    pub fn clear_at(&self, older_than_days: Option<i64>, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.keys()? {
            if let Some(days) = older_than_days {
                if let Some(entry) = self.load_entry(&key) {
                    if !entry.is_stale(Duration::days(days), now) {
                        continue;
                    }
                }
            }

            match self.store.remove(&key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to delete cache entry"),
            }
        }
        info!(removed, "Cleared cache entries");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for key in self.store.keys()? {
            stats.total_files += 1;
            stats.total_size_bytes += self.store.size(&key).unwrap_or(0);

            // Unreadable entries still count toward size, not timestamps
            let Some(entry) = self.load_entry(&key) else {
                continue;
            };
            let ts = entry.timestamp;
            if stats.oldest_timestamp.map_or(true, |oldest| ts < oldest) {
                stats.oldest_timestamp = Some(ts);
            }
            if stats.newest_timestamp.map_or(true, |newest| ts > newest) {
                stats.newest_timestamp = Some(ts);
            }
        }
        Ok(stats)
    }
}

// ============================================================================
// Tests
// ============================================================================
