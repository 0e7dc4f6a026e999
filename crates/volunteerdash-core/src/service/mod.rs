//! Aggregation service: turns raw API records into volunteers, hour entries
//! and opportunities, and derives the tables and metrics the dashboard shows.

pub mod metrics;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, DateRange};
use crate::geo::Coordinates;
use crate::geocode::{AddressRecord, GeocodeResult};
use crate::models::{id_string, HourEntry, Opportunity, OpportunityParticipation, Volunteer, LONG_TERM_MONTHS};
use crate::snapshot;

pub use metrics::{EngagementMetrics, HoursSummary, NamedTotal, ParticipationMetrics, PopularOpportunity};

/// Volunteers whose detail records are fetched when the listing is sparse
const DETAIL_FETCH_LIMIT: usize = 100;

/// What a load produced, including the parts that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub volunteers: usize,
    pub detailed_volunteers: usize,
    pub skipped_volunteers: usize,
    pub hour_entries: usize,
    pub skipped_hours: usize,
    /// Hour entries whose volunteer is not in the loaded set
    pub unmatched_hours: usize,
    pub opportunities: usize,
    pub skipped_opportunities: usize,
    pub hours_error: Option<String>,
    pub opportunities_error: Option<String>,
}

impl LoadReport {
    pub fn is_partial(&self) -> bool {
        self.hours_error.is_some() || self.opportunities_error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolunteerRow {
    pub id: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub join_date: Option<DateTime<Utc>>,
    pub status: String,
    pub total_hours: f64,
    pub engagement_score: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_zip_only: bool,
    pub is_long_term: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourRow {
    pub id: String,
    pub volunteer_id: String,
    pub volunteer_name: String,
    pub opportunity_id: String,
    pub opportunity_title: String,
    pub hours: f64,
    pub date: DateTime<Utc>,
    pub month: String,
    pub notes: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolunteerDistance {
    pub id: String,
    pub name: String,
    pub distance_km: f64,
}

#[derive(Debug, Default)]
pub struct DataService {
    pub volunteers: Vec<Volunteer>,
    pub opportunities: Vec<Opportunity>,
}

impl DataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_volunteers(volunteers: Vec<Volunteer>) -> Self {
        Self {
            volunteers,
            opportunities: Vec::new(),
        }
    }

    /// Replace the loaded data with a fresh pull from the API.
    ///
    /// Only a failure to list volunteers is fatal. Hours and opportunities
    /// failures leave the volunteers loaded and are recorded in the report.
    pub async fn load_from_api(&mut self, client: &mut ApiClient, range: &DateRange) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        let mut records = client.fetch_volunteers().await.context("Failed to fetch volunteers")?;
        info!(count = records.len(), "Fetched volunteer records");

        if records.first().is_some_and(Volunteer::needs_detail) {
            report.detailed_volunteers = enrich_with_details(client, &mut records).await;
        }

        let mut hours_by_volunteer: HashMap<String, Vec<HourEntry>> = HashMap::new();
        match client.fetch_all_hours(range).await {
            Ok(hour_records) => {
                for record in &hour_records {
                    match HourEntry::from_api(record) {
                        Ok(entry) => hours_by_volunteer
                            .entry(entry.volunteer_id.clone())
                            .or_default()
                            .push(entry),
                        Err(e) => {
                            warn!(error = %e, "Skipping hour entry");
                            report.skipped_hours += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch hours, continuing without them");
                report.hours_error = Some(format!("{:#}", e));
            }
        }

        let mut volunteers = Vec::with_capacity(records.len());
        for record in &records {
            let hours = record
                .get("id")
                .and_then(id_string)
                .and_then(|id| hours_by_volunteer.remove(&id))
                .unwrap_or_default();
            match Volunteer::from_api(record, hours) {
                Ok(volunteer) => {
                    report.hour_entries += volunteer.hours.len();
                    volunteers.push(volunteer);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping volunteer record");
                    report.skipped_volunteers += 1;
                }
            }
        }
        report.unmatched_hours = hours_by_volunteer.values().map(Vec::len).sum();
        if report.unmatched_hours > 0 {
            debug!(count = report.unmatched_hours, "Hour entries for volunteers outside the loaded set");
        }

        let mut opportunities = Vec::new();
        match client.fetch_opportunities().await {
            Ok(opportunity_records) => {
                for record in &opportunity_records {
                    match Opportunity::from_api(record) {
                        Ok(opportunity) => opportunities.push(opportunity),
                        Err(e) => {
                            warn!(error = %e, "Skipping opportunity record");
                            report.skipped_opportunities += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch opportunities, continuing without them");
                report.opportunities_error = Some(format!("{:#}", e));
            }
        }

        report.volunteers = volunteers.len();
        report.opportunities = opportunities.len();
        self.volunteers = volunteers;
        self.opportunities = opportunities;

        info!(
            volunteers = report.volunteers,
            hour_entries = report.hour_entries,
            opportunities = report.opportunities,
            partial = report.is_partial(),
            "Data load complete"
        );
        Ok(report)
    }

    /// Replace the loaded volunteers with those in a snapshot file.
    pub fn load_from_snapshot(&mut self, path: &Path, now: DateTime<Utc>) -> Result<usize> {
        let volunteers = snapshot::load_snapshot(path, now)
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
        self.volunteers = volunteers;
        self.opportunities.clear();
        Ok(self.volunteers.len())
    }

    /// Write the volunteers to a snapshot file. Returns the located count.
    pub fn save_snapshot(&self, path: &Path, now: DateTime<Utc>) -> Result<usize> {
        snapshot::save_snapshot(path, &self.volunteers, now)
            .with_context(|| format!("Failed to save snapshot {}", path.display()))
    }

    pub fn opportunity_titles(&self) -> HashMap<String, String> {
        self.opportunities
            .iter()
            .map(|o| (o.id.clone(), o.title.clone()))
            .collect()
    }

    pub fn volunteer_rows(&self, now: DateTime<Utc>) -> Vec<VolunteerRow> {
        self.volunteers
            .iter()
            .map(|v| {
                let coordinates = v.coordinates.filter(Coordinates::is_usable);
                VolunteerRow {
                    id: v.id.clone(),
                    name: v.display_name(),
                    first_name: v.first_name.clone(),
                    last_name: v.last_name.clone(),
                    email: v.email.clone(),
                    phone: v.phone.clone(),
                    address: v.full_address(),
                    city: v.city.clone(),
                    state: v.state.clone(),
                    zip_code: v.zip_code.clone(),
                    join_date: v.join_date,
                    status: v.status.clone(),
                    total_hours: v.total_hours(),
                    engagement_score: v.engagement_score(now),
                    latitude: coordinates.map(|c| c.latitude),
                    longitude: coordinates.map(|c| c.longitude),
                    is_zip_only: v.is_zip_only,
                    is_long_term: v.is_long_term(LONG_TERM_MONTHS, now),
                }
            })
            .collect()
    }

    pub fn hour_rows(&self) -> Vec<HourRow> {
        let titles = self.opportunity_titles();
        self.volunteers
            .iter()
            .flat_map(|v| {
                let name = v.display_name();
                let titles = &titles;
                v.hours.iter().map(move |h| HourRow {
                    id: h.id.clone(),
                    volunteer_id: h.volunteer_id.clone(),
                    volunteer_name: name.clone(),
                    opportunity_id: h.opportunity_id.clone(),
                    opportunity_title: metrics::opportunity_title(titles, &h.opportunity_id),
                    hours: h.hours,
                    date: h.date,
                    month: h.month_key(),
                    notes: h.notes.clone(),
                    status: h.status.clone(),
                })
            })
            .collect()
    }

    pub fn hours_summary(&self) -> HoursSummary {
        metrics::hours_summary(&self.volunteers, &self.opportunity_titles())
    }

    pub fn engagement_metrics(&self, now: DateTime<Utc>) -> EngagementMetrics {
        metrics::engagement_metrics(&self.volunteers, now)
    }

    pub fn participation(&self) -> Vec<OpportunityParticipation> {
        metrics::participation(&self.volunteers, &self.opportunity_titles())
    }

    pub fn participation_metrics(&self) -> ParticipationMetrics {
        metrics::participation_metrics(&self.volunteers, &self.opportunity_titles())
    }

    /// Addresses of volunteers that have no usable coordinates yet.
    pub fn geocode_requests(&self, exclude_zip_only: bool) -> Vec<AddressRecord> {
        self.volunteers
            .iter()
            .filter(|v| !v.coordinates.is_some_and(|c| c.is_usable()))
            .filter(|v| !(exclude_zip_only && v.is_zip_only))
            .filter_map(|v| {
                let address = v.full_address();
                if address.is_empty() {
                    debug!(volunteer_id = %v.id, "No address to geocode");
                    None
                } else {
                    Some(AddressRecord::new(v.id.clone(), address))
                }
            })
            .collect()
    }

    /// Attach geocoded coordinates by volunteer id. Returns how many matched.
    pub fn apply_geocodes(&mut self, results: &[GeocodeResult]) -> usize {
        let by_id: HashMap<&str, &GeocodeResult> = results.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut applied = 0;
        for volunteer in &mut self.volunteers {
            if let Some(result) = by_id.get(volunteer.id.as_str()) {
                volunteer.coordinates = Some(result.coordinates());
                volunteer.is_zip_only = result.is_zip_only;
                applied += 1;
            }
        }
        info!(applied, results = results.len(), "Applied geocoding results");
        applied
    }

    /// Great-circle distance from `reference` to each located volunteer,
    /// nearest first.
    pub fn distances_from(&self, reference: Coordinates) -> Vec<VolunteerDistance> {
        let mut distances: Vec<VolunteerDistance> = self
            .volunteers
            .iter()
            .filter_map(|v| {
                let here = v.coordinates.filter(Coordinates::is_usable)?;
                Some(VolunteerDistance {
                    id: v.id.clone(),
                    name: v.display_name(),
                    distance_km: reference.distance_km(&here),
                })
            })
            .collect();
        distances.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        distances
    }
}

/// Swap sparse listing records for full `users/{id}` records.
async fn enrich_with_details(client: &mut ApiClient, records: &mut [Value]) -> usize {
    let take = if client.fetch_limit().is_some() {
        records.len()
    } else {
        DETAIL_FETCH_LIMIT.min(records.len())
    };
    let ids: Vec<String> = records[..take]
        .iter()
        .filter_map(|r| r.get("id").and_then(id_string))
        .collect();
    info!(count = ids.len(), "Listing lacks contact fields, fetching volunteer details");

    let detailed = match client.fetch_detailed_volunteers(&ids).await {
        Ok(detailed) => detailed,
        Err(e) => {
            warn!(error = %e, "Failed to fetch volunteer details, using listing records");
            return 0;
        }
    };

    let mut by_id: HashMap<String, Value> = detailed
        .into_iter()
        .filter_map(|r| Some((r.get("id").and_then(id_string)?, r)))
        .collect();

    let mut replaced = 0;
    for record in records.iter_mut() {
        let Some(id) = record.get("id").and_then(id_string) else {
            continue;
        };
        if let Some(detail) = by_id.remove(&id) {
            *record = detail;
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn service() -> DataService {
        let mut located = Volunteer::new("1", "Ann", "Alder");
        located.address = Some("1 Main St".into());
        located.city = Some("Chicago".into());
        located.coordinates = Some(Coordinates::new(41.88, -87.63));

        let mut street = Volunteer::new("2", "Bo", "Birch");
        street.address = Some("2 Elm St".into());
        street.city = Some("Evanston".into());

        let mut zip = Volunteer::new("3", "Cy", "Cedar");
        zip.zip_code = Some("60601".into());
        zip.is_zip_only = true;

        let nowhere = Volunteer::new("4", "Di", "Dogwood");

        let mut far = Volunteer::new("5", "Ed", "Elm");
        far.coordinates = Some(Coordinates::new(43.04, -87.91));

        DataService::from_volunteers(vec![located, street, zip, nowhere, far])
    }

    #[test]
    fn test_geocode_requests() {
        let svc = service();
        let ids: Vec<String> = svc.geocode_requests(false).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let requests = svc.geocode_requests(true);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].address, "2 Elm St, Evanston");
    }

    #[test]
    fn test_apply_geocodes() {
        let mut svc = service();
        let applied = svc.apply_geocodes(&[
            GeocodeResult {
                id: "2".into(),
                latitude: 42.05,
                longitude: -87.68,
                is_zip_only: false,
            },
            GeocodeResult {
                id: "missing".into(),
                latitude: 1.0,
                longitude: 1.0,
                is_zip_only: false,
            },
        ]);
        assert_eq!(applied, 1);
        assert_eq!(svc.volunteers[1].coordinates, Some(Coordinates::new(42.05, -87.68)));
        assert_eq!(svc.geocode_requests(false).len(), 1);
    }

    #[test]
    fn test_distances_sorted() {
        let svc = service();
        let distances = svc.distances_from(Coordinates::new(41.88, -87.63));
        assert_eq!(distances.len(), 2);
        assert_eq!(distances[0].id, "1");
        assert!(distances[0].distance_km < 0.01);
        assert!(distances[1].distance_km > 100.0);
    }

    #[test]
    fn test_rows() {
        let mut svc = service();
        svc.opportunities.push(Opportunity::from_api(&serde_json::json!({"id": 9, "title": "Pantry"})).unwrap());
        svc.volunteers[0].hours.push(HourEntry {
            id: "h1".into(),
            volunteer_id: "1".into(),
            opportunity_id: "9".into(),
            hours: 3.0,
            date: now(),
            notes: None,
            status: "approved".into(),
        });

        let rows = svc.volunteer_rows(now());
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].total_hours, 3.0);
        assert_eq!(rows[0].latitude, Some(41.88));
        assert!(rows[2].is_zip_only);
        assert_eq!(rows[3].name, "Di Dogwood");

        let hours = svc.hour_rows();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].volunteer_name, "Ann Alder");
        assert_eq!(hours[0].opportunity_title, "Pantry");
        assert_eq!(hours[0].month, "2024-06");
    }

    #[test]
    fn test_snapshot_round_trip_through_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.geojson");
        let svc = service();
        assert_eq!(svc.save_snapshot(&path, now()).unwrap(), 2);

        let mut reloaded = DataService::new();
        assert_eq!(reloaded.load_from_snapshot(&path, now()).unwrap(), 5);
        assert_eq!(reloaded.volunteers[2].zip_code.as_deref(), Some("60601"));
        assert!(reloaded.volunteers[2].is_zip_only);
        for (before, after) in svc.volunteers.iter().zip(&reloaded.volunteers) {
            assert_eq!(after.full_address(), before.full_address());
            assert_eq!(after.has_zip_only_address(), before.has_zip_only_address());
        }

        // The reloaded snapshot geocodes the same addresses
        let requests = reloaded.geocode_requests(false);
        assert_eq!(requests, svc.geocode_requests(false));
        assert_eq!(requests[1].address, "60601");
    }
}
