//! Volunteerdash core library.
//!
//! Pulls volunteers, hour entries and opportunities from the Galaxy Digital
//! API, caches the raw responses on disk, geocodes volunteer addresses and
//! derives the engagement and participation metrics the dashboard shows.
//!
//! The library is front-end agnostic; `volunteerdash-cli` drives it.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod geo;
pub mod geocode;
pub mod models;
pub mod scoring;
pub mod service;
pub mod snapshot;
pub mod utils;

pub use api::{ApiClient, ApiError, DateRange, FetchLimit, RetryPolicy};
pub use auth::{CredentialStore, GalaxyCredentials, Session, SessionData};
pub use cache::{CacheStats, ResponseCache};
pub use config::Config;
pub use geo::Coordinates;
pub use geocode::{AddressRecord, BatchOptions, GeocodeCache, GeocodeClient, GeocodeResult, Geocoder};
pub use models::{HourEntry, Opportunity, OpportunityParticipation, Volunteer};
pub use scoring::{engagement_score, EngagementTier};
pub use service::{DataService, LoadReport};
pub use snapshot::{load_snapshot, save_snapshot, SnapshotError};
