// Raw Galaxy Digital record shapes and lenient field decoding.
// The API is inconsistent about types (ids and postal codes arrive as either
// numbers or strings) and about field names (`user_fname` vs `first_name`),
// so every field is optional here and normalized in the domain conversions.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("record has no id")]
    MissingId,

    #[error("hour entry {0} has no volunteer id")]
    MissingVolunteer(String),

    #[error("hour entry {id} has no usable date ({raw:?})")]
    InvalidDate { id: String, raw: Option<String> },

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Render an id-like value as a string; numbers and non-empty strings only.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accept strings, numbers and booleans as text; null and empty as absent.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// A `users` or `users/{id}` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiUser {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_fname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_lname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_postal: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zip_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
}

/// An `hours` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiHour {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub user_id: Value,
    #[serde(default)]
    pub need: Value,
    #[serde(default)]
    pub hour_hours: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hour_date_start: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hour_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hour_status: Option<String>,
}

/// A `needs` (opportunity) record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiNeed {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zip_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(record: &Value) -> Result<T, RecordError> {
    if !record.is_object() {
        return Err(RecordError::Malformed(format!("expected object, got {}", record)));
    }
    T::deserialize(record).map_err(|e| RecordError::Malformed(e.to_string()))
}
