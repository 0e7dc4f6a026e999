//! Address clean-up ahead of geocoding.

use std::sync::OnceLock;

use regex::Regex;

struct Patterns {
    unit: Regex,
    apartment: Regex,
    trailing_letter: Regex,
    whitespace: Regex,
    zip: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        unit: Regex::new(r"(?i)\bUnit\s+\w+").expect("static pattern"),
        apartment: Regex::new(r"(?i)\bApt\.?\s+\w+").expect("static pattern"),
        trailing_letter: Regex::new(r"(?i)\b[A-Z]$").expect("static pattern"),
        whitespace: Regex::new(r"\s+").expect("static pattern"),
        zip: Regex::new(r"^\d{5}(-\d{4})?$").expect("static pattern"),
    })
}

/// Strip unit and apartment designators that geocoders tend to choke on.
///
/// Removes `Unit X`, `Apt X` / `Apt. X`, a trailing single-letter unit and
/// periods, then collapses whitespace.
pub fn sanitize_address(address: &str) -> String {
    let p = patterns();
    let result = p.unit.replace_all(address, "");
    let result = p.apartment.replace_all(&result, "");
    let result = p.trailing_letter.replace_all(&result, "");
    let result = result.replace('.', "");
    let result = p.whitespace.replace_all(&result, " ");
    result.trim().to_string()
}

/// A bare `12345` or `12345-6789`, ignoring whitespace.
pub fn is_zip_code_only(address: &str) -> bool {
    let compact: String = address.chars().filter(|c| !c.is_whitespace()).collect();
    patterns().zip.is_match(&compact)
}

/// The five-digit prefix of a ZIP-only address.
pub fn zip5(address: &str) -> Option<String> {
    if !is_zip_code_only(address) {
        return None;
    }
    Some(address.chars().filter(char::is_ascii_digit).take(5).collect())
}

/// Cache key form of an address: lowercase with collapsed whitespace.
pub fn normalize_address_key(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_only_detection() {
        assert!(is_zip_code_only("60601"));
        assert!(is_zip_code_only("60601-1234"));
        assert!(is_zip_code_only(" 606 01 "));
        assert!(!is_zip_code_only("123 Main St, Chicago, IL 60601"));
        assert!(!is_zip_code_only("6060"));
        assert!(!is_zip_code_only("60601-12"));
        assert!(!is_zip_code_only(""));
    }

    #[test]
    fn test_zip5() {
        assert_eq!(zip5("60601-1234").as_deref(), Some("60601"));
        assert_eq!(zip5("60601").as_deref(), Some("60601"));
        assert_eq!(zip5("Chicago"), None);
    }

    #[test]
    fn test_sanitize_removes_units() {
        assert_eq!(sanitize_address("123 Main St Apt 4B, Chicago"), "123 Main St , Chicago");
        assert_eq!(sanitize_address("123 Main St Apt. 4B"), "123 Main St");
        assert_eq!(sanitize_address("9 Elm Rd unit 12"), "9 Elm Rd");
        assert_eq!(sanitize_address("456 Oak Ave B"), "456 Oak Ave");
        assert_eq!(sanitize_address("1 N. State St."), "1 N State St");
        assert_eq!(sanitize_address("  10   Lake   Shore Dr  "), "10 Lake Shore Dr");
    }

    #[test]
    fn test_sanitize_keeps_state_codes() {
        assert_eq!(
            sanitize_address("123 Main St, Chicago, IL 60601"),
            "123 Main St, Chicago, IL 60601"
        );
        assert_eq!(sanitize_address("Springfield, IL"), "Springfield, IL");
    }

    #[test]
    fn test_normalize_address_key() {
        assert_eq!(
            normalize_address_key("  123 MAIN St,\tChicago "),
            "123 main st, chicago"
        );
    }
}
