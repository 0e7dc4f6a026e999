use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::hours::HourEntry;
use super::record::{decode, id_string, ApiUser, RecordError};
use crate::geo::Coordinates;
use crate::scoring;
use crate::utils::parse_api_datetime;

/// Fields a `users` listing record must carry to skip the per-user detail fetch.
pub const DETAIL_FIELDS: [&str; 7] = [
    "first_name",
    "last_name",
    "email",
    "address",
    "city",
    "state",
    "zip_code",
];

/// Default number of months before a volunteer counts as long-term
pub const LONG_TERM_MONTHS: i64 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volunteer {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub join_date: Option<DateTime<Utc>>,
    pub status: String,
    pub coordinates: Option<Coordinates>,
    /// Whether the location is only known at ZIP-code resolution.
    pub is_zip_only: bool,
    pub hours: Vec<HourEntry>,
}

impl Volunteer {
    pub fn new(id: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
            phone: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            join_date: None,
            status: "active".to_string(),
            coordinates: None,
            is_zip_only: false,
            hours: Vec::new(),
        }
    }

    /// Build a volunteer from a `users` record plus its hour entries.
    ///
    /// `user_*` field names win over the plain ones when both are present.
    pub fn from_api(record: &Value, hours: Vec<HourEntry>) -> Result<Self, RecordError> {
        let raw: ApiUser = decode(record)?;
        let id = id_string(&raw.id).ok_or(RecordError::MissingId)?;

        let join_date = raw.created_at.as_deref().and_then(|s| {
            let parsed = parse_api_datetime(s);
            if parsed.is_none() {
                debug!(volunteer_id = %id, created_at = s, "Unparseable join date");
            }
            parsed
        });

        let mut volunteer = Self {
            first_name: raw.user_fname.or(raw.first_name).unwrap_or_default(),
            last_name: raw.user_lname.or(raw.last_name).unwrap_or_default(),
            email: raw.user_email.or(raw.email),
            phone: raw.user_phone.or(raw.phone),
            address: raw.user_address.or(raw.address),
            city: raw.user_city.or(raw.city),
            state: raw.user_state.or(raw.state),
            zip_code: raw.user_postal.or(raw.zip_code),
            join_date,
            status: raw
                .user_status
                .or(raw.status)
                .unwrap_or_else(|| "active".to_string()),
            coordinates: None,
            is_zip_only: false,
            hours,
            id,
        };
        volunteer.is_zip_only = volunteer.has_zip_only_address();
        Ok(volunteer)
    }

    /// Whether a listing record lacks fields that only the detail endpoint returns.
    pub fn needs_detail(record: &Value) -> bool {
        DETAIL_FIELDS.iter().any(|field| record.get(*field).is_none())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Name suitable for display, falling back to the id.
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            format!("Volunteer {}", self.id)
        } else {
            name
        }
    }

    /// Non-empty address components joined with ", ".
    pub fn full_address(&self) -> String {
        [&self.address, &self.city, &self.state, &self.zip_code]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A postal code with no street, city or state.
    pub fn has_zip_only_address(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        !blank(&self.zip_code) && blank(&self.address) && blank(&self.city) && blank(&self.state)
    }

    pub fn total_hours(&self) -> f64 {
        self.hours.iter().map(|h| h.hours).sum()
    }

    pub fn engagement_score(&self, now: DateTime<Utc>) -> f64 {
        scoring::engagement_score(&self.hours, now)
    }

    pub fn hours_by_opportunity(&self) -> BTreeMap<String, f64> {
        let mut result = BTreeMap::new();
        for entry in &self.hours {
            *result.entry(entry.opportunity_id.clone()).or_insert(0.0) += entry.hours;
        }
        result
    }

    pub fn hours_by_month(&self) -> BTreeMap<String, f64> {
        let mut result = BTreeMap::new();
        for entry in &self.hours {
            *result.entry(entry.month_key()).or_insert(0.0) += entry.hours;
        }
        result
    }

    /// Hours logged within `[start, end]`, inclusive.
    pub fn hours_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        self.hours
            .iter()
            .filter(|h| start <= h.date && h.date <= end)
            .map(|h| h.hours)
            .sum()
    }

    /// Joined at least `min_months` (of 30 days) before `now`.
    pub fn is_long_term(&self, min_months: i64, now: DateTime<Utc>) -> bool {
        match self.join_date {
            Some(joined) => (now - joined) >= Duration::days(min_months * 30),
            None => false,
        }
    }

    pub fn last_active(&self) -> Option<DateTime<Utc>> {
        self.hours.iter().map(|h| h.date).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn hour(opportunity: &str, hours: f64, y: i32, m: u32, d: u32) -> HourEntry {
        HourEntry {
            id: format!("{opportunity}-{y}{m}{d}"),
            volunteer_id: "1".into(),
            opportunity_id: opportunity.into(),
            hours,
            date: Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap(),
            notes: None,
            status: "approved".into(),
        }
    }

    #[test]
    fn test_from_api_prefers_user_fields() {
        let v = Volunteer::from_api(
            &json!({
                "id": 12,
                "user_fname": "Grace",
                "first_name": "Ignored",
                "user_lname": "Hopper",
                "user_email": "grace@example.org",
                "user_address": "123 Main St",
                "user_city": "Chicago",
                "user_state": "IL",
                "user_postal": "60601",
                "created_at": "2021-03-04T05:06:07Z"
            }),
            vec![],
        )
        .unwrap();

        assert_eq!(v.id, "12");
        assert_eq!(v.full_name(), "Grace Hopper");
        assert_eq!(v.full_address(), "123 Main St, Chicago, IL, 60601");
        assert_eq!(v.status, "active");
        assert!(v.join_date.is_some());
        assert!(!v.is_zip_only);
    }

    #[test]
    fn test_from_api_plain_fields_and_zip_only() {
        let v = Volunteer::from_api(
            &json!({"id": "a9", "first_name": "Lin", "zip_code": "60601", "status": "inactive"}),
            vec![],
        )
        .unwrap();
        assert_eq!(v.first_name, "Lin");
        assert_eq!(v.status, "inactive");
        assert!(v.is_zip_only);
        assert_eq!(v.full_address(), "60601");
    }

    #[test]
    fn test_from_api_requires_id() {
        let err = Volunteer::from_api(&json!({"first_name": "No", "last_name": "Id"}), vec![]).unwrap_err();
        assert_eq!(err, RecordError::MissingId);
    }

    #[test]
    fn test_needs_detail() {
        assert!(Volunteer::needs_detail(&json!({"id": 1, "first_name": "A"})));
        let complete = json!({
            "id": 1, "first_name": "A", "last_name": "B", "email": null,
            "address": "", "city": "", "state": "", "zip_code": ""
        });
        assert!(!Volunteer::needs_detail(&complete));
    }

    #[test]
    fn test_hour_aggregations() {
        let mut v = Volunteer::new("1", "A", "B");
        v.hours = vec![
            hour("n1", 2.0, 2024, 1, 5),
            hour("n1", 3.0, 2024, 2, 6),
            hour("n2", 1.5, 2024, 2, 7),
        ];

        assert_eq!(v.total_hours(), 6.5);
        assert_eq!(v.hours_by_opportunity().get("n1"), Some(&5.0));
        assert_eq!(v.hours_by_month().get("2024-02"), Some(&4.5));

        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
        assert_eq!(v.hours_in_range(start, end), 4.5);
        assert_eq!(v.last_active(), Some(Utc.with_ymd_and_hms(2024, 2, 7, 9, 0, 0).unwrap()));
    }

    #[test]
    fn test_is_long_term() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut v = Volunteer::new("1", "A", "B");
        assert!(!v.is_long_term(LONG_TERM_MONTHS, now));

        v.join_date = Some(now - Duration::days(200));
        assert!(v.is_long_term(LONG_TERM_MONTHS, now));

        v.join_date = Some(now - Duration::days(100));
        assert!(!v.is_long_term(LONG_TERM_MONTHS, now));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(Volunteer::new("7", "", "").display_name(), "Volunteer 7");
    }
}
