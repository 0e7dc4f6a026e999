//! Engagement scoring over a volunteer's hour entries.
//!
//! The score is a 0-100 composite of three capped components:
//!
//! | component | formula                                   | cap |
//! |-----------|-------------------------------------------|-----|
//! | hours     | total_hours / 100 × 50                    | 50  |
//! | frequency | distinct_active_days / 10 × 25            | 25  |
//! | recency   | 25 − days_since_last_activity / 30 × 5    | 25  |
//!
//! Recency loses five points per month of inactivity and bottoms out at 0.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::HourEntry;

const HOURS_CAP: f64 = 50.0;
const HOURS_FOR_CAP: f64 = 100.0;
const FREQUENCY_CAP: f64 = 25.0;
const DAYS_FOR_CAP: f64 = 10.0;
const RECENCY_CAP: f64 = 25.0;
const RECENCY_POINTS_PER_MONTH: f64 = 5.0;
const DAYS_PER_MONTH: f64 = 30.0;

/// Score at or above which a volunteer counts as highly engaged
pub const HIGH_ENGAGEMENT: f64 = 70.0;
/// Score at or above which a volunteer counts as moderately engaged
pub const MEDIUM_ENGAGEMENT: f64 = 40.0;

/// Individual score components, useful for explaining a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub hours: f64,
    pub frequency: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        (self.hours + self.frequency + self.recency).clamp(0.0, 100.0)
    }
}

pub fn breakdown(hours: &[HourEntry], now: DateTime<Utc>) -> ScoreBreakdown {
    let Some(latest) = hours.iter().map(|h| h.date).max() else {
        return ScoreBreakdown::default();
    };

    let total_hours: f64 = hours.iter().map(|h| h.hours.max(0.0)).sum();
    let active_days = hours.iter().map(HourEntry::day).collect::<HashSet<_>>().len();
    // Whole days; future-dated activity counts as today
    let days_since = (now - latest).num_days().max(0) as f64;

    ScoreBreakdown {
        hours: (total_hours / HOURS_FOR_CAP * HOURS_CAP).min(HOURS_CAP),
        frequency: (active_days as f64 / DAYS_FOR_CAP * FREQUENCY_CAP).min(FREQUENCY_CAP),
        recency: (RECENCY_CAP - days_since / DAYS_PER_MONTH * RECENCY_POINTS_PER_MONTH).max(0.0),
    }
}

/// Engagement score in `[0, 100]`; exactly 0 without any hour entries.
pub fn engagement_score(hours: &[HourEntry], now: DateTime<Utc>) -> f64 {
    breakdown(hours, now).total()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementTier {
    High,
    Medium,
    Low,
}

impl EngagementTier {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_ENGAGEMENT {
            EngagementTier::High
        } else if score >= MEDIUM_ENGAGEMENT {
            EngagementTier::Medium
        } else {
            EngagementTier::Low
        }
    }
}

impl fmt::Display for EngagementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngagementTier::High => write!(f, "High"),
            EngagementTier::Medium => write!(f, "Medium"),
            EngagementTier::Low => write!(f, "Low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn entry(days_ago: i64, hours: f64) -> HourEntry {
        HourEntry {
            id: format!("h{days_ago}"),
            volunteer_id: "v1".into(),
            opportunity_id: String::new(),
            hours,
            date: now() - Duration::days(days_ago),
            notes: None,
            status: "approved".into(),
        }
    }

    #[test]
    fn test_no_hours_scores_zero() {
        assert_eq!(engagement_score(&[], now()), 0.0);
    }

    #[test]
    fn test_known_score() {
        // 20 hours over 4 days, last active 60 days ago:
        // hours 10, frequency 10, recency 25 - 2*5 = 15
        let hours = vec![entry(60, 5.0), entry(61, 5.0), entry(62, 5.0), entry(63, 5.0)];
        let parts = breakdown(&hours, now());
        assert_eq!(parts.hours, 10.0);
        assert_eq!(parts.frequency, 10.0);
        assert_eq!(parts.recency, 15.0);
        assert_eq!(engagement_score(&hours, now()), 35.0);
    }

    #[test]
    fn test_caps_reach_hundred() {
        let hours: Vec<HourEntry> = (0..12).map(|d| entry(d, 20.0)).collect();
        assert_eq!(engagement_score(&hours, now()), 100.0);
    }

    #[test]
    fn test_same_day_counts_once() {
        let hours = vec![entry(1, 1.0), entry(1, 1.0)];
        assert_eq!(breakdown(&hours, now()).frequency, 2.5);
    }

    #[test]
    fn test_recency_floors_at_zero() {
        let hours = vec![entry(400, 1.0)];
        assert_eq!(breakdown(&hours, now()).recency, 0.0);
    }

    #[test]
    fn test_future_dates_do_not_exceed_cap() {
        let hours: Vec<HourEntry> = (0..12).map(|d| entry(-d - 5, 20.0)).collect();
        let parts = breakdown(&hours, now());
        assert_eq!(parts.recency, 25.0);
        assert!(engagement_score(&hours, now()) <= 100.0);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(EngagementTier::from_score(85.0), EngagementTier::High);
        assert_eq!(EngagementTier::from_score(70.0), EngagementTier::High);
        assert_eq!(EngagementTier::from_score(40.0), EngagementTier::Medium);
        assert_eq!(EngagementTier::from_score(39.9), EngagementTier::Low);
    }

    proptest! {
        #[test]
        fn prop_score_bounded(
            entries in proptest::collection::vec((-30i64..1000, 0.0f64..500.0), 0..40),
        ) {
            let hours: Vec<HourEntry> = entries.iter().map(|(d, h)| entry(*d, *h)).collect();
            let score = engagement_score(&hours, now());
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn prop_more_hours_never_lowers_score(
            days in proptest::collection::vec(0i64..365, 1..20),
            base in 0.0f64..50.0,
            extra in 0.0f64..50.0,
        ) {
            let lower: Vec<HourEntry> = days.iter().map(|d| entry(*d, base)).collect();
            let higher: Vec<HourEntry> = days.iter().map(|d| entry(*d, base + extra)).collect();
            prop_assert!(engagement_score(&higher, now()) >= engagement_score(&lower, now()));
        }

        #[test]
        fn prop_more_active_days_never_lowers_score(
            days in proptest::collection::vec(1i64..365, 1..20),
            extra_day in 1i64..365,
            hours in 0.0f64..20.0,
        ) {
            // The added entry is no more recent than the latest and carries no hours,
            // so only the distinct-day count can change
            let latest = *days.iter().min().unwrap_or(&1);
            let older = latest.max(extra_day);
            let base: Vec<HourEntry> = days.iter().map(|d| entry(*d, hours)).collect();
            let mut more = base.clone();
            more.push(entry(older, 0.0));
            prop_assert!(engagement_score(&more, now()) >= engagement_score(&base, now()));
        }
    }
}
