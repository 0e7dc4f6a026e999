use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hours::HourEntry;
use super::record::{decode, id_string, ApiNeed, RecordError};
use crate::utils::parse_api_datetime;

/// A volunteer opportunity (a Galaxy "need").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: String,
}

impl Opportunity {
    pub fn from_api(record: &Value) -> Result<Self, RecordError> {
        let raw: ApiNeed = decode(record)?;
        let id = id_string(&raw.id).ok_or(RecordError::MissingId)?;

        Ok(Self {
            title: raw.title.unwrap_or_else(|| format!("Opportunity {}", id)),
            id,
            description: raw.description,
            address: raw.address,
            city: raw.city,
            state: raw.state,
            zip_code: raw.zip_code,
            start_date: raw.start_date.as_deref().and_then(parse_api_datetime),
            end_date: raw.end_date.as_deref().and_then(parse_api_datetime),
            status: raw.status.unwrap_or_else(|| "active".to_string()),
        })
    }

    pub fn full_address(&self) -> String {
        [&self.address, &self.city, &self.state, &self.zip_code]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Length of the opportunity in hours, when both ends are known.
    pub fn duration_hours(&self) -> Option<f64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() as f64 / 3600.0),
            _ => None,
        }
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| end < now)
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start_date.is_some_and(|start| start > now)
    }

    /// Started and not yet ended. An open-ended opportunity stays ongoing.
    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= now && now <= end,
            (Some(start), None) => start <= now,
            _ => false,
        }
    }
}

/// Who worked an opportunity and for how long.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityParticipation {
    pub opportunity_id: String,
    pub title: String,
    pub volunteer_ids: BTreeSet<String>,
    pub total_hours: f64,
}

impl OpportunityParticipation {
    pub fn new(opportunity_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            opportunity_id: opportunity_id.into(),
            title: title.into(),
            volunteer_ids: BTreeSet::new(),
            total_hours: 0.0,
        }
    }

    pub fn record(&mut self, entry: &HourEntry) {
        self.volunteer_ids.insert(entry.volunteer_id.clone());
        self.total_hours += entry.hours;
    }

    pub fn volunteer_count(&self) -> usize {
        self.volunteer_ids.len()
    }

    pub fn average_hours_per_volunteer(&self) -> f64 {
        if self.volunteer_ids.is_empty() {
            0.0
        } else {
            self.total_hours / self.volunteer_ids.len() as f64
        }
    }
}
