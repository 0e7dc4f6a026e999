//! Bounded-concurrency geocoding of many addresses.

use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::address::{is_zip_code_only, sanitize_address, zip5};
use super::cache::GeocodeCache;
use super::client::{GeocodeClient, GeocodeError};
use crate::geo::Coordinates;

/// Maximum offset in degrees added to ZIP centroids, per axis (~300 m).
pub const ZIP_JITTER_DEGREES: f64 = 0.003;

/// Default number of concurrent geocoding requests
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// An address to resolve, tagged with the id of its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: String,
    pub address: String,
}

impl AddressRecord {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_zip_only: bool,
}

impl GeocodeResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_workers: usize,
    /// Skip ZIP-only addresses instead of placing them at a jittered centroid.
    pub exclude_zip_only: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            exclude_zip_only: false,
        }
    }
}

/// Geocoding client plus its address cache.
#[derive(Clone)]
pub struct Geocoder {
    client: GeocodeClient,
    cache: GeocodeCache,
}

impl Geocoder {
    pub fn new(client: GeocodeClient, cache: GeocodeCache) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Resolve one address, consulting the cache first.
    ///
    /// ZIP-only input resolves to the ZIP centroid with random jitter; the
    /// centroid itself is what gets cached. Returns the coordinates and
    /// whether the input was ZIP-only.
    pub async fn geocode(&self, address: &str) -> Result<(Coordinates, bool), GeocodeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        if let Some(zip) = zip5(address) {
            let centroid = match self.cache.get(&zip) {
                Some(hit) => hit,
                None => {
                    let centroid = self.client.lookup(&zip).await?;
                    self.cache.put(&zip, centroid);
                    centroid
                }
            };
            return Ok((jitter(centroid), true));
        }

        if let Some(hit) = self.cache.get(address) {
            return Ok((hit, false));
        }
        let coordinates = self.client.lookup(&sanitize_address(address)).await?;
        self.cache.put(address, coordinates);
        Ok((coordinates, false))
    }

    /// Geocode many addresses with at most `min(max_workers, len)` requests
    /// in flight.
    ///
    /// Failures, empty and skipped addresses are logged and left out of the
    /// result, which keeps input order.
    pub async fn geocode_many(&self, addresses: &[AddressRecord], options: BatchOptions) -> Vec<GeocodeResult> {
        if addresses.is_empty() {
            return Vec::new();
        }
        if !self.client.has_api_key() {
            error!("{}", GeocodeError::MissingApiKey);
            return Vec::new();
        }

        let workers = options.max_workers.min(addresses.len()).max(1);
        info!(count = addresses.len(), workers, "Geocoding addresses");

        let mut resolved: Vec<(usize, GeocodeResult)> = stream::iter(addresses.iter().enumerate())
            .map(|(index, record)| async move {
                if record.address.trim().is_empty() {
                    warn!(id = %record.id, "No address, skipping");
                    return None;
                }
                if options.exclude_zip_only && is_zip_code_only(&record.address) {
                    debug!(id = %record.id, "Skipping ZIP-only address");
                    return None;
                }
                match self.geocode(&record.address).await {
                    Ok((coordinates, is_zip_only)) => Some((
                        index,
                        GeocodeResult {
                            id: record.id.clone(),
                            latitude: coordinates.latitude,
                            longitude: coordinates.longitude,
                            is_zip_only,
                        },
                    )),
                    Err(e) => {
                        warn!(id = %record.id, address = %record.address, error = %e, "Could not geocode address");
                        None
                    }
                }
            })
            .buffer_unordered(workers)
            .filter_map(|result| async move { result })
            .collect()
            .await;

        resolved.sort_by_key(|(index, _)| *index);
        info!(resolved = resolved.len(), requested = addresses.len(), "Geocoding complete");
        resolved.into_iter().map(|(_, result)| result).collect()
    }
}

fn jitter(centroid: Coordinates) -> Coordinates {
    let mut rng = rand::thread_rng();
    Coordinates::new(
        centroid.latitude + rng.gen_range(-ZIP_JITTER_DEGREES..=ZIP_JITTER_DEGREES),
        centroid.longitude + rng.gen_range(-ZIP_JITTER_DEGREES..=ZIP_JITTER_DEGREES),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_geocoder(api_key: Option<&str>) -> Geocoder {
        // Port 9 (discard) refuses connections, so any network call fails fast
        let client = GeocodeClient::new("http://127.0.0.1:9/geocode", api_key.map(String::from)).unwrap();
        Geocoder::new(client, GeocodeCache::in_memory())
    }

    #[test]
    fn test_jitter_bounds() {
        let centroid = Coordinates::new(41.88, -87.62);
        for _ in 0..200 {
            let j = jitter(centroid);
            assert!((j.latitude - centroid.latitude).abs() <= ZIP_JITTER_DEGREES + 1e-12);
            assert!((j.longitude - centroid.longitude).abs() <= ZIP_JITTER_DEGREES + 1e-12);
        }
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_network() {
        let geocoder = offline_geocoder(Some("key"));
        geocoder.cache().put("123 Main St, Chicago, IL", Coordinates::new(41.9, -87.6));

        let (coords, zip_only) = geocoder.geocode("123  main st, chicago, il").await.unwrap();
        assert_eq!(coords, Coordinates::new(41.9, -87.6));
        assert!(!zip_only);
    }

    #[tokio::test]
    async fn test_zip_centroid_cached_without_jitter() {
        let geocoder = offline_geocoder(Some("key"));
        geocoder.cache().put("60601", Coordinates::new(41.88, -87.62));

        let (coords, zip_only) = geocoder.geocode("60601-1234").await.unwrap();
        assert!(zip_only);
        assert!((coords.latitude - 41.88).abs() <= ZIP_JITTER_DEGREES + 1e-12);
        assert_eq!(geocoder.cache().get("60601"), Some(Coordinates::new(41.88, -87.62)));
    }

    #[tokio::test]
    async fn test_batch_skips_failures_and_keeps_order() {
        let geocoder = offline_geocoder(Some("key"));
        geocoder.cache().put("1 A St", Coordinates::new(1.0, 1.0));
        geocoder.cache().put("3 C St", Coordinates::new(3.0, 3.0));

        let input = vec![
            AddressRecord::new("a", "1 A St"),
            AddressRecord::new("b", "2 B St"),
            AddressRecord::new("c", "3 C St"),
            AddressRecord::new("d", "   "),
        ];
        let results = geocoder.geocode_many(&input, BatchOptions::default()).await;

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(results.len() <= input.len());
    }

    #[tokio::test]
    async fn test_batch_exclude_zip_only() {
        let geocoder = offline_geocoder(Some("key"));
        geocoder.cache().put("60601", Coordinates::new(41.88, -87.62));
        let input = vec![AddressRecord::new("z", "60601")];

        let options = BatchOptions {
            max_workers: 4,
            exclude_zip_only: true,
        };
        assert!(geocoder.geocode_many(&input, options).await.is_empty());

        let results = geocoder.geocode_many(&input, BatchOptions::default()).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_zip_only);
    }

    #[tokio::test]
    async fn test_batch_without_api_key_is_empty() {
        let geocoder = offline_geocoder(None);
        geocoder.cache().put("1 A St", Coordinates::new(1.0, 1.0));
        let results = geocoder
            .geocode_many(&[AddressRecord::new("a", "1 A St")], BatchOptions::default())
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_workers_still_progresses() {
        let geocoder = offline_geocoder(Some("key"));
        geocoder.cache().put("1 A St", Coordinates::new(1.0, 1.0));
        let options = BatchOptions {
            max_workers: 0,
            exclude_zip_only: false,
        };
        let results = geocoder
            .geocode_many(&[AddressRecord::new("a", "1 A St")], options)
            .await;
        assert_eq!(results.len(), 1);
    }
}
