//! Utility functions for parsing and formatting API values.

pub mod format;

pub use format::{age_display, clean_hours_value, parse_api_datetime, truncate_body};
