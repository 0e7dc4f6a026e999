use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::geo::Coordinates;
use crate::utils::truncate_body;

/// Google Geocoding API endpoint
pub const DEFAULT_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("No geocoding API key configured (set GOOGLE_MAPS_API_KEY)")]
    MissingApiKey,

    #[error("Empty address")]
    EmptyAddress,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Geocoding request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("No results for {address:?} (status {status})")]
    NoResults { address: String, status: String },
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeHit>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// Thin client for `GET {base}?address=..&key=..`.
#[derive(Clone)]
pub struct GeocodeClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeocodeClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// One request for one query string. No retries.
    pub async fn lookup(&self, query: &str) -> Result<Coordinates, GeocodeError> {
        let key = self.api_key.as_deref().ok_or(GeocodeError::MissingApiKey)?;
        if query.trim().is_empty() {
            return Err(GeocodeError::EmptyAddress);
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("address", query), ("key", key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: GeocodeResponse = response.json().await?;
        match parsed.results.first() {
            Some(hit) if parsed.status == "OK" => {
                let location = &hit.geometry.location;
                debug!(query, lat = location.lat, lng = location.lng, "Geocoded");
                Ok(Coordinates::new(location.lat, location.lng))
            }
            _ => Err(GeocodeError::NoResults {
                address: query.to_string(),
                status: parsed.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = GeocodeClient::new("http://127.0.0.1:9", Some("  ".into())).unwrap();
        assert!(!client.has_api_key());
        assert!(matches!(client.lookup("60601").await, Err(GeocodeError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let client = GeocodeClient::new("http://127.0.0.1:9", Some("k".into())).unwrap();
        assert!(matches!(client.lookup("   ").await, Err(GeocodeError::EmptyAddress)));
    }

    #[test]
    fn test_response_shape() {
        let parsed: GeocodeResponse = serde_json::from_str(
            r#"{"status":"OK","results":[{"geometry":{"location":{"lat":41.1,"lng":-87.2}}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.results[0].geometry.location.lng, -87.2);

        let empty: GeocodeResponse = serde_json::from_str(r#"{"status":"ZERO_RESULTS"}"#).unwrap();
        assert!(empty.results.is_empty());
    }
}
