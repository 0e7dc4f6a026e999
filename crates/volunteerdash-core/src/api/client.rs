//! API client for the Galaxy Digital REST API.
//!
//! Every GET goes through the response cache first. Misses are fetched with
//! the bounded retry loop and written back. List endpoints are walked with
//! `since_id` pagination and the assembled result is cached once more under
//! an aggregate key so a repeated full fetch is a single lookup.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::pagination::{collect_pages, Collected, FetchLimit, PageSource, PAGE_SIZE};
use super::retry::{Attempts, RetryPolicy};
use super::ApiError;
use crate::auth::{GalaxyCredentials, SessionData};
use crate::cache::{stringify_value, CacheStats, Params, ResponseCache};

/// Production API root
pub const DEFAULT_BASE_URL: &str = "https://api.galaxydigital.com/api";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Volunteers fetched per detail batch.
const DETAIL_BATCH_SIZE: usize = 100;

/// Pause between detail batches.
const DETAIL_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Pseudo-endpoint the assembled detail records are cached under.
const DETAILED_VOLUNTEERS: &str = "detailed_volunteers";

/// Optional `start_date` / `end_date` filter for hour queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(start) = self.start {
            params.insert("start_date".into(), json!(start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end {
            params.insert("end_date".into(), json!(end.format("%Y-%m-%d").to_string()));
        }
        params
    }
}

/// API client for Galaxy Digital.
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Option<GalaxyCredentials>,
    session: Option<SessionData>,
    cache: Option<ResponseCache>,
    retry: RetryPolicy,
    page_size: usize,
    fetch_limit: Option<FetchLimit>,
    batch_pause: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
            session: None,
            cache: None,
            retry: RetryPolicy::default(),
            page_size: PAGE_SIZE,
            fetch_limit: None,
            batch_pause: DETAIL_BATCH_PAUSE,
        })
    }

    pub fn with_credentials(mut self, credentials: GalaxyCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Cap the volunteer fetch, see [`FetchLimit`].
    pub fn with_fetch_limit(mut self, limit: Option<FetchLimit>) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Reuse a previously issued token.
    pub fn set_session(&mut self, session: SessionData) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&SessionData> {
        self.session.as_ref()
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn fetch_limit(&self) -> Option<FetchLimit> {
        self.fetch_limit
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exchange the configured credentials for a bearer token.
    ///
    /// A 401 here means the credentials are wrong and is not retried.
    pub async fn login(&mut self) -> Result<SessionData> {
        let credentials = self
            .credentials
            .clone()
            .ok_or_else(|| ApiError::MissingCredentials("no credentials configured".into()))?;
        let missing = credentials.missing();
        if !missing.is_empty() {
            return Err(ApiError::MissingCredentials(missing.join(", ")).into());
        }

        let url = self.url("users/login");
        let body = json!({
            "key": credentials.api_key,
            "user_email": credentials.email,
            "user_password": credentials.password,
        });
        let mut attempts = Attempts::default();

        let payload: Value = loop {
            let sent = self
                .client
                .post(&url)
                .header(header::ACCEPT, "application/json")
                .json(&body)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    attempts.server += 1;
                    if attempts.server_exhausted(&self.retry) {
                        return Err(ApiError::NetworkError(e)).context("Failed to send login request");
                    }
                    warn!(attempt = attempts.server, error = %e, "Login request failed, retrying");
                    tokio::time::sleep(self.retry.server_retry_delay).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                break response.json().await.context("Failed to parse login response")?;
            }
            match status.as_u16() {
                401 => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(ApiError::AuthenticationFailed(crate::utils::truncate_body(&text)).into());
                }
                429 => {
                    attempts.rate_limited += 1;
                    if attempts.rate_limit_exhausted(&self.retry) {
                        return Err(ApiError::RateLimited(self.retry.max_rate_limit_retries).into());
                    }
                    let wait = self.retry.retry_after(response.headers());
                    warn!(wait_secs = wait.as_secs(), "Login rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                500..=599 => {
                    attempts.server += 1;
                    if attempts.server_exhausted(&self.retry) {
                        let text = response.text().await.unwrap_or_default();
                        return Err(ApiError::from_status(status, &text).into());
                    }
                    warn!(status = %status, attempt = attempts.server, "Login server error, retrying");
                    tokio::time::sleep(self.retry.server_retry_delay).await;
                }
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(ApiError::from_status(status, &text).into());
                }
            }
        };

        let token = payload
            .pointer("/data/token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("login response has no data.token".into()))?;

        let session = SessionData::new(token, credentials.email.clone());
        info!(email = %credentials.email, "Authenticated with Galaxy Digital");
        self.session = Some(session.clone());
        Ok(session)
    }

    async fn bearer_token(&mut self) -> Result<String> {
        match &self.session {
            Some(session) if !session.is_expired() => Ok(session.token.clone()),
            _ => Ok(self.login().await?.token),
        }
    }

    /// GET with the retry loop: 429 waits, 401 re-authenticates once,
    /// 5xx and network errors retry a fixed number of times.
    async fn request_json(&mut self, path: &str, params: &Params) -> Result<Value> {
        let url = self.url(path);
        let query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.clone(), stringify_value(v)))
            .collect();
        let mut attempts = Attempts::default();

        loop {
            let token = self.bearer_token().await?;
            let sent = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .header(header::ACCEPT, "application/json")
                .query(&query)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    attempts.server += 1;
                    if attempts.server_exhausted(&self.retry) {
                        return Err(ApiError::NetworkError(e))
                            .with_context(|| format!("Failed to send GET request to {}", url));
                    }
                    warn!(url = %url, attempt = attempts.server, error = %e, "Request failed, retrying");
                    tokio::time::sleep(self.retry.server_retry_delay).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json()
                    .await
                    .with_context(|| format!("Failed to parse JSON response from {}", url));
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    attempts.rate_limited += 1;
                    if attempts.rate_limit_exhausted(&self.retry) {
                        return Err(ApiError::RateLimited(self.retry.max_rate_limit_retries).into());
                    }
                    let wait = self.retry.retry_after(response.headers());
                    warn!(url = %url, wait_secs = wait.as_secs(), retry = attempts.rate_limited, "Rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                StatusCode::UNAUTHORIZED if !attempts.reauthenticated => {
                    attempts.reauthenticated = true;
                    warn!(url = %url, "Token rejected, re-authenticating");
                    self.session = None;
                    self.login().await?;
                }
                s if s.is_server_error() => {
                    attempts.server += 1;
                    if attempts.server_exhausted(&self.retry) {
                        let text = response.text().await.unwrap_or_default();
                        return Err(ApiError::from_status(status, &text).into());
                    }
                    warn!(url = %url, status = %status, attempt = attempts.server, "Server error, retrying");
                    tokio::time::sleep(self.retry.server_retry_delay).await;
                }
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(ApiError::from_status(status, &text).into());
                }
            }
        }
    }

    /// The `data` member of a GET response, served from the cache when fresh.
    pub async fn get_data(&mut self, path: &str, params: &Params) -> Result<Value> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(path, params)) {
            debug!(path, "Cache hit");
            return Ok(cached);
        }

        let body = self.request_json(path, params).await?;
        let data = match body {
            Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
            other => other,
        };

        if let Some(cache) = &self.cache {
            cache.put(path, params, &data);
        }
        Ok(data)
    }

    fn paged_params(&self, base: &Params) -> Params {
        let mut params = base.clone();
        params.insert("per_page".into(), json!(self.page_size));
        params.insert("show_inactive".into(), json!("No"));
        params
    }

    fn cached_records(&self, endpoint: &str, params: &Params) -> Option<Vec<Value>> {
        match self.cache.as_ref()?.get(endpoint, params)? {
            Value::Array(records) => Some(records),
            _ => None,
        }
    }

    async fn walk(&mut self, endpoint: &str, params: &Params, limit: Option<FetchLimit>) -> Result<Collected> {
        let page_size = self.page_size;
        let mut pages = EndpointPages {
            client: self,
            endpoint,
            params,
        };
        collect_pages(&mut pages, page_size, limit)
            .await
            .with_context(|| format!("Failed to fetch {}", endpoint))
    }

    /// Every record of a paginated endpoint, in server order.
    pub async fn fetch_all(&mut self, endpoint: &str, base: &Params) -> Result<Vec<Value>> {
        let params = self.paged_params(base);
        let aggregate = aggregate_params(&params, false);

        if let Some(records) = self.cached_records(endpoint, &aggregate) {
            debug!(endpoint, count = records.len(), "Complete dataset served from cache");
            return Ok(records);
        }

        let collected = self.walk(endpoint, &params, None).await?;
        if collected.complete {
            if let Some(cache) = &self.cache {
                cache.put(endpoint, &aggregate, &Value::Array(collected.records.clone()));
            }
        }
        info!(endpoint, count = collected.records.len(), "Fetched records");
        Ok(collected.records)
    }

    /// At most `limit.max_records` records of a paginated endpoint.
    ///
    /// A truncated result is cached under a `test_mode` key so it never
    /// stands in for the complete dataset. A cached complete dataset does
    /// serve a limited request.
    pub async fn fetch_all_limited(&mut self, endpoint: &str, base: &Params, limit: FetchLimit) -> Result<Vec<Value>> {
        let params = self.paged_params(base);
        let complete_key = aggregate_params(&params, false);
        let limited_key = limited_params(&params, limit);

        if let Some(mut records) = self.cached_records(endpoint, &complete_key) {
            records.truncate(limit.max_records);
            return Ok(records);
        }
        if let Some(records) = self.cached_records(endpoint, &limited_key) {
            debug!(endpoint, count = records.len(), "Limited dataset served from cache");
            return Ok(records);
        }

        let collected = self.walk(endpoint, &params, Some(limit)).await?;
        if let Some(cache) = &self.cache {
            let key = if collected.complete { &complete_key } else { &limited_key };
            cache.put(endpoint, key, &Value::Array(collected.records.clone()));
        }
        info!(endpoint, count = collected.records.len(), complete = collected.complete, "Fetched limited records");
        Ok(collected.records)
    }

    /// All volunteers, honouring the configured fetch limit.
    pub async fn fetch_volunteers(&mut self) -> Result<Vec<Value>> {
        match self.fetch_limit {
            Some(limit) => self.fetch_all_limited("users", &Params::new(), limit).await,
            None => self.fetch_all("users", &Params::new()).await,
        }
    }

    pub async fn fetch_volunteer(&mut self, id: &str) -> Result<Value> {
        self.get_data(&format!("users/{}", id), &Params::new()).await
    }

    /// Hours for one volunteer. A volunteer without hours is a 404 upstream.
    pub async fn fetch_volunteer_hours(&mut self, id: &str) -> Result<Vec<Value>> {
        let data = self.get_data(&format!("users/{}/hours", id), &Params::new()).await;
        records_or_empty(data)
    }

    pub async fn fetch_all_hours(&mut self, range: &DateRange) -> Result<Vec<Value>> {
        self.fetch_all("hours", &range.to_params()).await
    }

    pub async fn fetch_hours_summary(&mut self, range: &DateRange) -> Result<Value> {
        self.get_data("hours/summary", &range.to_params()).await
    }

    pub async fn fetch_opportunities(&mut self) -> Result<Vec<Value>> {
        self.fetch_all("needs", &Params::new()).await
    }

    pub async fn fetch_opportunity(&mut self, id: &str) -> Result<Value> {
        self.get_data(&format!("needs/{}", id), &Params::new()).await
    }

    pub async fn fetch_opportunity_participants(&mut self, id: &str) -> Result<Vec<Value>> {
        let data = self.get_data(&format!("needs/{}/responses", id), &Params::new()).await;
        records_or_empty(data)
    }

    /// Full `users/{id}` records for many volunteers, in batches.
    ///
    /// Individual failures are logged and skipped. The assembled list is
    /// cached under the sorted id set.
    pub async fn fetch_detailed_volunteers(&mut self, ids: &[String]) -> Result<Vec<Value>> {
        let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut key_params = Params::new();
        key_params.insert("ids".into(), json!(sorted.join(",")));

        if let Some(records) = self.cached_records(DETAILED_VOLUNTEERS, &key_params) {
            debug!(count = records.len(), "Detailed volunteers served from cache");
            return Ok(records);
        }

        let mut records = Vec::with_capacity(ids.len());
        for (index, batch) in ids.chunks(DETAIL_BATCH_SIZE).enumerate() {
            if index > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            debug!(batch = index + 1, size = batch.len(), "Fetching volunteer details");
            for id in batch {
                match self.fetch_volunteer(id).await {
                    Ok(Value::Null) => warn!(volunteer_id = %id, "Empty volunteer detail"),
                    Ok(record) => records.push(record),
                    Err(e) => warn!(volunteer_id = %id, error = %e, "Failed to fetch volunteer detail"),
                }
            }
        }

        if let Some(cache) = &self.cache {
            cache.put(DETAILED_VOLUNTEERS, &key_params, &Value::Array(records.clone()));
        }
        Ok(records)
    }

    pub fn cache_stats(&self) -> Result<Option<CacheStats>> {
        self.cache.as_ref().map(ResponseCache::stats).transpose()
    }

    pub fn clear_cache(&self, older_than_days: Option<i64>) -> Result<usize> {
        match &self.cache {
            Some(cache) => cache.clear(older_than_days),
            None => Ok(0),
        }
    }
}

/// Key parameters for an assembled dataset. Built from the request's base
/// parameters, which never carry a `since_id` cursor.
fn aggregate_params(params: &Params, test_mode: bool) -> Params {
    let mut key = params.clone();
    key.insert("complete_dataset".into(), json!(true));
    if test_mode {
        key.insert("test_mode".into(), json!(true));
    }
    key
}

fn limited_params(params: &Params, limit: FetchLimit) -> Params {
    let mut key = aggregate_params(params, true);
    key.insert("test_limit".into(), json!(limit.max_records));
    key
}

fn records_or_empty(data: Result<Value>) -> Result<Vec<Value>> {
    match data {
        Ok(Value::Array(records)) => Ok(records),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(other) => Err(ApiError::InvalidResponse(format!("expected a list, got {}", other)).into()),
        Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::NotFound(_))) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

struct EndpointPages<'a> {
    client: &'a mut ApiClient,
    endpoint: &'a str,
    params: &'a Params,
}

impl PageSource for EndpointPages<'_> {
    async fn fetch_page(&mut self, since_id: Option<&Value>) -> Result<Vec<Value>> {
        let mut params = self.params.clone();
        if let Some(cursor) = since_id {
            params.insert("since_id".into(), cursor.clone());
        }
        match self.client.get_data(self.endpoint, &params).await? {
            Value::Array(records) => Ok(records),
            Value::Null => Ok(Vec::new()),
            other => Err(ApiError::InvalidResponse(format!(
                "{} returned a non-list page: {}",
                self.endpoint,
                crate::utils::truncate_body(&other.to_string())
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_params() {
        let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 1, 1), None);
        let params = range.to_params();
        assert_eq!(params.get("start_date"), Some(&json!("2024-01-01")));
        assert!(!params.contains_key("end_date"));
        assert!(DateRange::default().to_params().is_empty());
    }

    #[test]
    fn test_aggregate_keys_are_distinct() {
        let mut base = Params::new();
        base.insert("per_page".into(), json!(150));
        let complete = aggregate_params(&base, false);
        let limited = limited_params(&base, FetchLimit::records(10));

        assert_eq!(complete.get("complete_dataset"), Some(&json!(true)));
        assert!(!complete.contains_key("test_mode"));
        assert_eq!(limited.get("test_mode"), Some(&json!(true)));
        assert_ne!(
            crate::cache::cache_key("users", &complete),
            crate::cache::cache_key("users", &limited)
        );
    }

    #[test]
    fn test_records_or_empty() {
        assert!(records_or_empty(Ok(Value::Null)).unwrap().is_empty());
        assert_eq!(records_or_empty(Ok(json!([1, 2]))).unwrap().len(), 2);
        let not_found = Err(ApiError::NotFound("no hours".into()).into());
        assert!(records_or_empty(not_found).unwrap().is_empty());
        assert!(records_or_empty(Err(ApiError::Unauthorized.into())).is_err());
        assert!(records_or_empty(Ok(json!({"x": 1}))).is_err());
    }

    #[test]
    fn test_base_url_normalized() {
        let client = ApiClient::new("https://example.org/api/").unwrap();
        assert_eq!(client.url("/users"), "https://example.org/api/users");
    }
}
