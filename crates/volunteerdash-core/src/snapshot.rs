//! GeoJSON snapshot of volunteers for the map view.
//!
//! Each volunteer becomes a `Feature` with a `Point` geometry (`[lng, lat]`)
//! when coordinates are known, or a null geometry flagged `needs_geocoding`.
//! A snapshot can be loaded back as an offline data source.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::Coordinates;
use crate::models::record::lenient_string;
use crate::models::{id_string, HourEntry, Volunteer};
use crate::utils::{clean_hours_value, parse_api_datetime};

/// Default snapshot file name
pub const DEFAULT_SNAPSHOT_FILE: &str = "addresses.geojson";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid GeoJSON: {0}")]
    Format(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Option<Geometry>,
    pub properties: VolunteerProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl Geometry {
    pub fn point(coordinates: Coordinates) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: vec![coordinates.longitude, coordinates.latitude],
        }
    }

    /// Coordinates of a usable `Point`.
    pub fn to_coordinates(&self) -> Option<Coordinates> {
        if self.kind != "Point" || self.coordinates.len() < 2 {
            return None;
        }
        Some(Coordinates::new(self.coordinates[1], self.coordinates[0])).filter(Coordinates::is_usable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolunteerProperties {
    pub id: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    /// Full display address
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub join_date: Option<DateTime<Utc>>,
    pub status: String,
    pub total_hours: f64,
    pub engagement_score: f64,
    pub needs_geocoding: bool,
    pub is_zip_only: bool,
    pub hours: Vec<HourEntry>,
}

impl Feature {
    pub fn from_volunteer(volunteer: &Volunteer, now: DateTime<Utc>) -> Self {
        let geometry = volunteer
            .coordinates
            .filter(Coordinates::is_usable)
            .map(Geometry::point);

        Self {
            kind: "Feature".to_string(),
            properties: VolunteerProperties {
                id: volunteer.id.clone(),
                name: volunteer.display_name(),
                first_name: volunteer.first_name.clone(),
                last_name: volunteer.last_name.clone(),
                email: volunteer.email.clone(),
                phone: volunteer.phone.clone(),
                street: volunteer.address.clone(),
                address: volunteer.full_address(),
                city: volunteer.city.clone(),
                state: volunteer.state.clone(),
                zip_code: volunteer.zip_code.clone(),
                join_date: volunteer.join_date,
                status: volunteer.status.clone(),
                total_hours: volunteer.total_hours(),
                engagement_score: volunteer.engagement_score(now),
                needs_geocoding: geometry.is_none(),
                is_zip_only: volunteer.is_zip_only,
                hours: volunteer.hours.clone(),
            },
            geometry,
        }
    }
}

pub fn to_feature_collection(volunteers: &[Volunteer], now: DateTime<Utc>) -> FeatureCollection {
    FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features: volunteers
            .iter()
            .map(|v| Feature::from_volunteer(v, now))
            .collect(),
    }
}

/// Write volunteers to `path` via a temp file and rename. Returns the
/// number of features with a geometry.
pub fn save_snapshot(path: &Path, volunteers: &[Volunteer], now: DateTime<Utc>) -> Result<usize, SnapshotError> {
    let collection = to_feature_collection(volunteers, now);
    let located = collection.features.iter().filter(|f| f.geometry.is_some()).count();
    let contents = serde_json::to_string_pretty(&collection)?;

    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let temp_path = path.with_extension("geojson.tmp");
    let mut file = fs::File::create(&temp_path).map_err(io_err)?;
    file.write_all(contents.as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;

    info!(
        path = %path.display(),
        features = collection.features.len(),
        located,
        needs_geocoding = collection.features.len() - located,
        "Saved GeoJSON snapshot"
    );
    Ok(located)
}

/// Properties as found in snapshots, including older or hand-edited ones.
#[derive(Debug, Default, Deserialize)]
struct LooseProperties {
    #[serde(default)]
    id: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    street: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    zip_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    join_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(default)]
    is_zip_only: Option<bool>,
    #[serde(default)]
    is_placeholder: bool,
    #[serde(default)]
    hours: Option<LooseHours>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseHours {
    Entries(Vec<LooseHourEntry>),
    Total(f64),
}

#[derive(Debug, Deserialize)]
struct LooseHourEntry {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    opportunity_id: Value,
    #[serde(default)]
    hours: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    notes: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
}

/// Read volunteers back from a snapshot.
///
/// Placeholder and malformed features are skipped. Hour entries without a
/// date are dated `now`.
pub fn load_snapshot(path: &Path, now: DateTime<Utc>) -> Result<Vec<Volunteer>, SnapshotError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let document: Value = serde_json::from_str(&contents)?;

    if document.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(SnapshotError::Format("not a FeatureCollection".into()));
    }
    let features = document
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| SnapshotError::Format("missing features array".into()))?;

    let mut volunteers = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        match volunteer_from_feature(feature, now) {
            Ok(Some(volunteer)) => volunteers.push(volunteer),
            Ok(None) => debug!(index, "Skipping placeholder feature"),
            Err(reason) => warn!(index, reason = %reason, "Skipping malformed feature"),
        }
    }

    info!(path = %path.display(), count = volunteers.len(), "Loaded volunteers from snapshot");
    Ok(volunteers)
}

fn volunteer_from_feature(feature: &Value, now: DateTime<Utc>) -> Result<Option<Volunteer>, String> {
    let properties = feature
        .get("properties")
        .filter(|p| p.is_object())
        .ok_or("feature has no properties")?;
    let props = LooseProperties::deserialize(properties).map_err(|e| e.to_string())?;
    if props.is_placeholder {
        return Ok(None);
    }
    let id = id_string(&props.id).ok_or("feature has no id")?;

    let coordinates = match feature.get("geometry") {
        None | Some(Value::Null) => None,
        Some(geometry) => Geometry::deserialize(geometry)
            .map_err(|e| format!("bad geometry: {}", e))?
            .to_coordinates(),
    };

    // Explicit name fields win even when empty; `name` may be a fallback label
    let has_key = |key: &str| properties.get(key).is_some();
    let (first_name, last_name) = if has_key("first_name") || has_key("last_name") {
        (props.first_name.unwrap_or_default(), props.last_name.unwrap_or_default())
    } else {
        split_name(props.name.as_deref().unwrap_or_default())
    };

    let hours = match props.hours {
        Some(LooseHours::Entries(entries)) => entries
            .into_iter()
            .enumerate()
            .map(|(i, h)| HourEntry {
                id: id_string(&h.id).unwrap_or_else(|| (i + 1).to_string()),
                volunteer_id: id.clone(),
                opportunity_id: id_string(&h.opportunity_id).unwrap_or_default(),
                hours: loose_hours_value(&h.hours),
                date: h.date.as_deref().and_then(parse_api_datetime).unwrap_or(now),
                notes: h.notes,
                status: h.status.unwrap_or_else(|| "approved".to_string()),
            })
            .collect(),
        Some(LooseHours::Total(total)) if total > 0.0 => vec![HourEntry {
            id: "1".to_string(),
            volunteer_id: id.clone(),
            opportunity_id: String::new(),
            hours: total,
            date: now,
            notes: None,
            status: "approved".to_string(),
        }],
        _ => Vec::new(),
    };

    let mut volunteer = Volunteer::new(id, first_name, last_name);
    volunteer.email = props.email;
    volunteer.phone = props.phone;
    // A null street means no street; only older snapshots lack the key
    volunteer.address = if has_key("street") { props.street } else { props.address };
    volunteer.city = props.city;
    volunteer.state = props.state;
    volunteer.zip_code = props.zip_code;
    volunteer.join_date = props.join_date.as_deref().and_then(parse_api_datetime);
    if let Some(status) = props.status {
        volunteer.status = status;
    }
    volunteer.coordinates = coordinates;
    volunteer.hours = hours;
    volunteer.is_zip_only = props
        .is_zip_only
        .unwrap_or_else(|| volunteer.has_zip_only_address());
    Ok(Some(volunteer))
}

fn loose_hours_value(raw: &Value) -> f64 {
    match raw {
        Value::Number(n) => n.as_f64().unwrap_or_default().max(0.0),
        Value::String(s) => clean_hours_value(s).unwrap_or_default(),
        _ => 0.0,
    }
}

fn split_name(name: &str) -> (String, String) {
    match name.trim().split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}
