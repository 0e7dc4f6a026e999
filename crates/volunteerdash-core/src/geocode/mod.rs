//! Address geocoding through the Google Geocoding API.
//!
//! Addresses are sanitized, looked up in a normalized-address cache and only
//! then sent to the API. ZIP-only addresses resolve to a jittered centroid so
//! neighbours sharing a ZIP code do not stack on one map point.

pub mod address;
pub mod batch;
pub mod cache;
pub mod client;

pub use address::{is_zip_code_only, normalize_address_key, sanitize_address, zip5};
pub use batch::{AddressRecord, BatchOptions, GeocodeResult, Geocoder, DEFAULT_MAX_WORKERS, ZIP_JITTER_DEGREES};
pub use cache::{GeocodeCache, GeocodeCacheEntry, GEOCODE_SUBDIR};
pub use client::{GeocodeClient, GeocodeError, DEFAULT_GEOCODE_URL};
