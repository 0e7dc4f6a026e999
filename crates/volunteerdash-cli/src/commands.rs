//! Subcommand handlers. Each prints its result as JSON on stdout.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use volunteerdash_core::service::{
    EngagementMetrics, HourRow, HoursSummary, ParticipationMetrics, VolunteerRow,
};
use volunteerdash_core::{
    ApiClient, BatchOptions, CacheStats, Config, Coordinates, CredentialStore, DataService, DateRange, GeocodeCache,
    GeocodeClient, Geocoder, LoadReport, ResponseCache, Session,
};

/// Where `report` takes its volunteers from.
pub enum Source {
    Snapshot,
    Api(DateRange),
}

#[derive(Serialize)]
struct Report {
    volunteers: usize,
    hours_summary: HoursSummary,
    engagement: EngagementMetrics,
    participation: ParticipationMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    volunteer_rows: Option<Vec<VolunteerRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hour_rows: Option<Vec<HourRow>>,
}

#[derive(Serialize)]
struct GeocodeSummary {
    requested: usize,
    geocoded: usize,
    applied: usize,
    located_in_snapshot: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Password from the environment, else from the keychain.
fn resolve_password(config: &mut Config) {
    if config.password.is_some() {
        return;
    }
    let Some(email) = config.email.clone() else {
        return;
    };
    match CredentialStore::get_password(&email) {
        Ok(password) => config.password = Some(password),
        Err(e) => warn!(error = %e, "No stored password in keychain"),
    }
}

fn api_client(config: &Config) -> Result<ApiClient> {
    let mut config = config.clone();
    resolve_password(&mut config);

    let mut client = ApiClient::new(config.base_url.clone())?
        .with_credentials(config.credentials())
        .with_fetch_limit(config.fetch_limit());
    if config.use_cache {
        let dir = config.response_cache_dir()?;
        client = client.with_cache(ResponseCache::open(&dir, config.cache_max_age_days)?);
    }
    Ok(client)
}

fn geocoder(config: &Config) -> Result<Geocoder> {
    let client = GeocodeClient::new(config.geocode_url.clone(), config.geocode_api_key.clone())?;
    let cache = GeocodeCache::open(&config.cache_dir()?)?;
    Ok(Geocoder::new(client, cache))
}

/// Load from the API, reusing and then refreshing the saved session.
async fn load_service(config: &Config, range: &DateRange) -> Result<(DataService, LoadReport)> {
    let mut client = api_client(config)?;
    let mut session = Session::new(config.cache_dir()?);
    if let Err(e) = session.load() {
        warn!(error = %e, "Ignoring unreadable session file");
    }
    if let Some(saved) = config.email.as_deref().and_then(|email| session.valid_for(email)) {
        info!(minutes_left = saved.minutes_until_expiry(), "Reusing saved session");
        client.set_session(saved.clone());
    }

    let mut service = DataService::new();
    let report = service.load_from_api(&mut client, range).await?;
    if report.is_partial() {
        warn!(
            hours_error = ?report.hours_error,
            opportunities_error = ?report.opportunities_error,
            "Loaded with missing data"
        );
    }

    if let Some(data) = client.session().cloned() {
        session.update(data);
        if let Err(e) = session.save() {
            warn!(error = %e, "Failed to save session");
        }
    }
    Ok((service, report))
}

async fn geocode_service(service: &mut DataService, config: &Config, options: BatchOptions) -> Result<GeocodeSummary> {
    let requests = service.geocode_requests(options.exclude_zip_only);
    let results = geocoder(config)?.geocode_many(&requests, options).await;
    let applied = service.apply_geocodes(&results);
    Ok(GeocodeSummary {
        requested: requests.len(),
        geocoded: results.len(),
        applied,
        located_in_snapshot: 0,
    })
}

pub async fn load(config: &Config, range: &DateRange, geocode: bool, exclude_zip_only: bool) -> Result<()> {
    let (mut service, report) = load_service(config, range).await?;

    if geocode {
        let options = BatchOptions {
            max_workers: config.geocode_workers,
            exclude_zip_only,
        };
        let summary = geocode_service(&mut service, config, options).await?;
        info!(geocoded = summary.geocoded, requested = summary.requested, "Geocoded volunteers");
    }

    let located = service.save_snapshot(&config.snapshot_path, Utc::now())?;
    info!(path = %config.snapshot_path.display(), located, "Snapshot written");
    print_json(&report)
}

pub async fn geocode(config: &Config, exclude_zip_only: bool, workers: Option<usize>) -> Result<()> {
    let now = Utc::now();
    let mut service = DataService::new();
    service.load_from_snapshot(&config.snapshot_path, now)?;

    let options = BatchOptions {
        max_workers: workers.unwrap_or(config.geocode_workers),
        exclude_zip_only,
    };
    let mut summary = geocode_service(&mut service, config, options).await?;
    summary.located_in_snapshot = service.save_snapshot(&config.snapshot_path, now)?;
    print_json(&summary)
}

pub async fn report(config: &Config, source: Source, volunteers: bool, hours: bool) -> Result<()> {
    let now = Utc::now();
    let service = match source {
        Source::Api(range) => load_service(config, &range).await?.0,
        Source::Snapshot => {
            let mut service = DataService::new();
            service.load_from_snapshot(&config.snapshot_path, now)?;
            service
        }
    };

    let report = Report {
        volunteers: service.volunteers.len(),
        hours_summary: service.hours_summary(),
        engagement: service.engagement_metrics(now),
        participation: service.participation_metrics(),
        volunteer_rows: volunteers.then(|| service.volunteer_rows(now)),
        hour_rows: hours.then(|| service.hour_rows()),
    };
    print_json(&report)
}

pub fn distances(config: &Config, lat: f64, lon: f64, limit: Option<usize>) -> Result<()> {
    let reference = Coordinates::new(lat, lon);
    anyhow::ensure!(reference.is_usable(), "Invalid reference point {}, {}", lat, lon);

    let mut service = DataService::new();
    service.load_from_snapshot(&config.snapshot_path, Utc::now())?;
    let mut distances = service.distances_from(reference);
    if let Some(limit) = limit {
        distances.truncate(limit);
    }
    print_json(&distances)
}

fn cache_stats_json(dir: &Path, stats: &CacheStats, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "dir": dir,
        "entries": stats.total_files,
        "size_bytes": stats.total_size_bytes,
        "total_size_mb": stats.total_size_mb(),
        "oldest_timestamp": stats.oldest_timestamp,
        "newest_timestamp": stats.newest_timestamp,
        "last_updated": stats.last_updated(now),
    })
}

pub fn cache_stats(config: &Config) -> Result<()> {
    let dir = config.response_cache_dir()?;
    let cache = ResponseCache::open(&dir, config.cache_max_age_days)?;
    let stats = cache.stats()?;
    print_json(&cache_stats_json(&dir, &stats, Utc::now()))
}

pub fn cache_clear(config: &Config, older_than: Option<i64>) -> Result<()> {
    let cache = ResponseCache::open(&config.response_cache_dir()?, config.cache_max_age_days)?;
    let removed = cache.clear(older_than)?;
    info!(removed, "Cleared response cache");
    print_json(&serde_json::json!({ "removed": removed }))
}

pub fn store_password(config: &Config, email: Option<String>) -> Result<()> {
    let email = email
        .or_else(|| config.email.clone())
        .context("No email given and GALAXY_EMAIL is not set")?;
    let password = rpassword::prompt_password(format!("Galaxy password for {}: ", email))?;
    anyhow::ensure!(!password.is_empty(), "Password cannot be empty");
    CredentialStore::store(&email, &password)?;
    eprintln!("Password stored in keychain for {}", email);
    Ok(())
}

/// Drop the saved session and, optionally, the keychain password.
pub fn logout(config: &Config, email: Option<String>, forget_password: bool) -> Result<()> {
    let mut session = Session::new(config.cache_dir()?);
    session.clear().context("Failed to remove saved session")?;
    info!("Cleared saved session");

    if forget_password {
        let email = email
            .or_else(|| config.email.clone())
            .context("No email given and GALAXY_EMAIL is not set")?;
        CredentialStore::delete(&email)?;
        eprintln!("Password removed from keychain for {}", email);
    }
    print_json(&serde_json::json!({
        "session_cleared": true,
        "password_removed": forget_password,
    }))
}

/// Print the effective configuration. The password is never included.
pub fn config_show(config: &Config) -> Result<()> {
    print_json(config)
}

/// Persist the effective configuration to the config file.
pub fn config_save(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    config.save_to(&path)?;
    eprintln!("Configuration written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cache_stats_json_includes_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let stats = CacheStats {
            total_files: 3,
            total_size_bytes: 2048,
            oldest_timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            newest_timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()),
        };

        let value = cache_stats_json(Path::new("/tmp/vd/api"), &stats, now);
        assert_eq!(value["dir"], "/tmp/vd/api");
        assert_eq!(value["entries"], 3);
        assert_eq!(value["size_bytes"], 2048);
        assert_eq!(value["oldest_timestamp"], "2024-05-01T00:00:00Z");
        assert_eq!(value["newest_timestamp"], "2024-05-31T12:00:00Z");
        assert_eq!(value["last_updated"], stats.last_updated(now));
    }

    #[test]
    fn test_cache_stats_json_empty_cache() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let value = cache_stats_json(Path::new("cache"), &CacheStats::default(), now);
        assert_eq!(value["entries"], 0);
        assert!(value["oldest_timestamp"].is_null());
        assert!(value["newest_timestamp"].is_null());
        assert_eq!(value["last_updated"], "never");
    }

    #[test]
    fn test_logout_removes_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(volunteerdash_core::SessionData::new("token", "me@example.org"));
        session.save().unwrap();
        assert!(dir.path().join("session.json").exists());

        let config = Config {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        logout(&config, None, false).unwrap();
        assert!(!dir.path().join("session.json").exists());

        // A second logout with nothing saved is fine
        logout(&config, None, false).unwrap();
    }
}
