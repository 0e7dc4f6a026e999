// Address-level geocode cache. Independent of the API response cache:
// entries never expire and live in their own directory.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::address::normalize_address_key;
use crate::cache::{FileStore, LayeredStore, MemoryStore, Store};
use crate::geo::Coordinates;

/// Subdirectory of the cache directory holding geocode entries
pub const GEOCODE_SUBDIR: &str = "geocode";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone)]
pub struct GeocodeCache {
    store: Arc<dyn Store>,
}

impl GeocodeCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// File-backed cache under `<cache_dir>/geocode`.
    pub fn open(cache_dir: &Path) -> Result<Self> {
        let files = FileStore::new(cache_dir.join(GEOCODE_SUBDIR))?;
        Ok(Self::new(Arc::new(LayeredStore::new(Arc::new(files)))))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn key(normalized: &str) -> String {
        hex::encode(Sha256::digest(normalized.as_bytes()))
    }

    pub fn get(&self, address: &str) -> Option<Coordinates> {
        let normalized = normalize_address_key(address);
        let contents = match self.store.read(&Self::key(&normalized)) {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(e) => {
                warn!(address = %normalized, error = %e, "Failed to read geocode cache");
                return None;
            }
        };
        match serde_json::from_str::<GeocodeCacheEntry>(&contents) {
            Ok(entry) if entry.address == normalized => {
                debug!(address = %normalized, "Geocode cache hit");
                Some(Coordinates::new(entry.latitude, entry.longitude))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(address = %normalized, error = %e, "Corrupt geocode cache entry");
                None
            }
        }
    }

    /// Store coordinates for an address. Failures are logged and ignored.
    pub fn put(&self, address: &str, coordinates: Coordinates) {
        let normalized = normalize_address_key(address);
        let entry = GeocodeCacheEntry {
            address: normalized.clone(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        };
        let result = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|contents| self.store.write(&Self::key(&normalized), &contents));
        if let Err(e) = result {
            warn!(address = %normalized, error = %e, "Failed to write geocode cache");
        }
    }

    pub fn len(&self) -> usize {
        self.store.keys().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_normalized() {
        let cache = GeocodeCache::in_memory();
        assert!(cache.is_empty());
        cache.put("123 Main St,  Chicago", Coordinates::new(41.88, -87.63));

        assert_eq!(cache.get("123 MAIN ST, chicago"), Some(Coordinates::new(41.88, -87.63)));
        assert_eq!(cache.get("124 Main St, Chicago"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        GeocodeCache::open(dir.path())
            .unwrap()
            .put("60601", Coordinates::new(41.88, -87.62));

        assert!(dir.path().join(GEOCODE_SUBDIR).is_dir());
        let reopened = GeocodeCache::open(dir.path()).unwrap();
        assert_eq!(reopened.get("60601"), Some(Coordinates::new(41.88, -87.62)));
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = GeocodeCache::new(store.clone());
        store
            .write(&GeocodeCache::key("60601"), "not json")
            .unwrap();
        assert_eq!(cache.get("60601"), None);
    }
}
