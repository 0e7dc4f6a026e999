use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Maximum length for response bodies quoted in errors and logs
const MAX_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_LENGTH {
        return body.to_string();
    }
    // Back off to a char boundary so multi-byte text never panics
    let mut end = MAX_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// Parse a timestamp as the Galaxy API emits it.
///
/// Accepts `2022-08-09 00:00:00`, RFC 3339 (`2022-08-09T00:00:00Z`,
/// `2022-08-09T00:00:00+02:00`) and bare dates. Naive values are read as UTC.
pub fn parse_api_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Clean an hours value that may arrive as `"2.5"`, `"2.5 hrs"` or `2.5`.
///
/// Everything except ASCII digits and `.` is dropped before parsing, so the
/// result is never negative. Returns `None` when nothing parseable remains.
pub fn clean_hours_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|h| h.is_finite())
}

/// Render an age as "just now", "5m ago", "3h ago" or "2d ago"
pub fn age_display(age: chrono::Duration) -> String {
    let minutes = age.num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / 1440)
    }
}
