use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::record::{decode, id_string, ApiHour, RecordError};
use crate::utils::{clean_hours_value, parse_api_datetime};

/// Hours logged by one volunteer against (optionally) one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourEntry {
    pub id: String,
    pub volunteer_id: String,
    #[serde(default)]
    pub opportunity_id: String,
    pub hours: f64,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "approved".to_string()
}

impl HourEntry {
    /// Decode an `hours` record.
    ///
    /// The hours value is cleaned (non-numeric text dropped, 0 when nothing
    /// remains). Entries without a volunteer or a parseable date are rejected.
    pub fn from_api(record: &Value) -> Result<Self, RecordError> {
        let raw: ApiHour = decode(record)?;

        let id = id_string(&raw.id).unwrap_or_default();
        let volunteer_id =
            id_string(&raw.user_id).ok_or_else(|| RecordError::MissingVolunteer(id.clone()))?;

        let date = raw
            .hour_date_start
            .as_deref()
            .and_then(parse_api_datetime)
            .ok_or_else(|| RecordError::InvalidDate {
                id: id.clone(),
                raw: raw.hour_date_start.clone(),
            })?;

        let opportunity_id = raw.need.get("id").and_then(id_string).unwrap_or_default();

        Ok(Self {
            hours: hours_value(&id, &raw.hour_hours),
            id,
            volunteer_id,
            opportunity_id,
            date,
            notes: raw.hour_description,
            status: raw.hour_status.unwrap_or_else(default_status),
        })
    }

    /// Calendar day of the entry (UTC).
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }

    /// `YYYY-MM` bucket of the entry.
    pub fn month_key(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }
}

fn hours_value(id: &str, raw: &Value) -> f64 {
    let text = match raw {
        Value::Null => return 0.0,
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match clean_hours_value(&text) {
        Some(hours) => hours,
        None => {
            warn!(hour_id = id, raw = %text, "Invalid hours value, using 0");
            0.0
        }
    }
}
