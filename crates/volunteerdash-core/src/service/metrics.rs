//! Aggregate metrics over the loaded volunteers.
//!
//! Everything here is recomputed from the volunteers' hour entries on each
//! call; nothing is cached between calls.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{OpportunityParticipation, Volunteer, LONG_TERM_MONTHS};
use crate::scoring::EngagementTier;

/// Entries in the top volunteer / opportunity lists
const TOP_HOURS: usize = 10;

/// Entries in the participation leaderboards
const TOP_PARTICIPATION: usize = 5;

/// Title used for hours not tied to an opportunity
const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedTotal {
    pub name: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HoursSummary {
    pub total_hours: f64,
    pub average_hours_per_volunteer: f64,
    pub total_volunteers: usize,
    pub total_opportunities: usize,
    pub hours_by_month: BTreeMap<String, f64>,
    pub hours_by_opportunity: BTreeMap<String, f64>,
    pub top_volunteers: Vec<NamedTotal>,
    pub top_opportunities: Vec<NamedTotal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngagementMetrics {
    pub average_engagement_score: f64,
    pub high_engagement_count: usize,
    pub medium_engagement_count: usize,
    pub low_engagement_count: usize,
    pub long_term_volunteer_count: usize,
    pub long_term_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularOpportunity {
    pub title: String,
    pub volunteer_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticipationMetrics {
    pub average_volunteers_per_opportunity: f64,
    pub average_hours_per_opportunity: f64,
    pub most_popular_opportunities: Vec<PopularOpportunity>,
    pub highest_hour_opportunities: Vec<NamedTotal>,
}

/// Opportunity title for an id, falling back to a generated one.
pub fn opportunity_title(titles: &HashMap<String, String>, opportunity_id: &str) -> String {
    if opportunity_id.is_empty() {
        return UNASSIGNED.to_string();
    }
    titles
        .get(opportunity_id)
        .cloned()
        .unwrap_or_else(|| format!("Opportunity {}", opportunity_id))
}

/// Largest totals first, ties broken by name.
fn top_n(totals: impl IntoIterator<Item = (String, f64)>, n: usize) -> Vec<NamedTotal> {
    let mut ranked: Vec<NamedTotal> = totals
        .into_iter()
        .map(|(name, hours)| NamedTotal { name, hours })
        .collect();
    ranked.sort_by(|a, b| b.hours.total_cmp(&a.hours).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(n);
    ranked
}

pub fn hours_summary(volunteers: &[Volunteer], titles: &HashMap<String, String>) -> HoursSummary {
    let entries: Vec<_> = volunteers.iter().flat_map(|v| v.hours.iter()).collect();
    if entries.is_empty() {
        return HoursSummary {
            total_volunteers: volunteers.len(),
            ..HoursSummary::default()
        };
    }

    let total_hours: f64 = entries.iter().map(|h| h.hours).sum();
    let active_volunteers = volunteers.iter().filter(|v| !v.hours.is_empty()).count();
    let opportunity_ids: HashSet<&str> = entries
        .iter()
        .map(|h| h.opportunity_id.as_str())
        .filter(|id| !id.is_empty())
        .collect();

    let mut hours_by_month = BTreeMap::new();
    let mut hours_by_opportunity = BTreeMap::new();
    for entry in &entries {
        *hours_by_month.entry(entry.month_key()).or_insert(0.0) += entry.hours;
        *hours_by_opportunity
            .entry(opportunity_title(titles, &entry.opportunity_id))
            .or_insert(0.0) += entry.hours;
    }

    let mut by_volunteer: HashMap<String, f64> = HashMap::new();
    for volunteer in volunteers.iter().filter(|v| !v.hours.is_empty()) {
        *by_volunteer.entry(volunteer.display_name()).or_insert(0.0) += volunteer.total_hours();
    }

    HoursSummary {
        total_hours,
        average_hours_per_volunteer: total_hours / active_volunteers as f64,
        total_volunteers: active_volunteers,
        total_opportunities: opportunity_ids.len(),
        top_volunteers: top_n(by_volunteer, TOP_HOURS),
        top_opportunities: top_n(hours_by_opportunity.clone(), TOP_HOURS),
        hours_by_month,
        hours_by_opportunity,
    }
}

pub fn engagement_metrics(volunteers: &[Volunteer], now: DateTime<Utc>) -> EngagementMetrics {
    if volunteers.is_empty() {
        return EngagementMetrics::default();
    }

    let mut metrics = EngagementMetrics::default();
    let mut score_sum = 0.0;
    for volunteer in volunteers {
        let score = volunteer.engagement_score(now);
        score_sum += score;
        match EngagementTier::from_score(score) {
            EngagementTier::High => metrics.high_engagement_count += 1,
            EngagementTier::Medium => metrics.medium_engagement_count += 1,
            EngagementTier::Low => metrics.low_engagement_count += 1,
        }
        if volunteer.is_long_term(LONG_TERM_MONTHS, now) {
            metrics.long_term_volunteer_count += 1;
        }
    }

    let count = volunteers.len() as f64;
    metrics.average_engagement_score = score_sum / count;
    metrics.long_term_percentage = metrics.long_term_volunteer_count as f64 / count * 100.0;
    metrics
}

/// Participation per opportunity, ordered by opportunity id.
/// Hours without an opportunity are left out.
pub fn participation(volunteers: &[Volunteer], titles: &HashMap<String, String>) -> Vec<OpportunityParticipation> {
    let mut by_id: BTreeMap<&str, OpportunityParticipation> = BTreeMap::new();
    for entry in volunteers.iter().flat_map(|v| v.hours.iter()) {
        if entry.opportunity_id.is_empty() {
            continue;
        }
        by_id
            .entry(entry.opportunity_id.as_str())
            .or_insert_with(|| {
                OpportunityParticipation::new(
                    entry.opportunity_id.clone(),
                    opportunity_title(titles, &entry.opportunity_id),
                )
            })
            .record(entry);
    }
    by_id.into_values().collect()
}

pub fn participation_metrics(volunteers: &[Volunteer], titles: &HashMap<String, String>) -> ParticipationMetrics {
    let rows = participation(volunteers, titles);
    if rows.is_empty() {
        return ParticipationMetrics::default();
    }

    let count = rows.len() as f64;
    let mut popular: Vec<PopularOpportunity> = rows
        .iter()
        .map(|p| PopularOpportunity {
            title: p.title.clone(),
            volunteer_count: p.volunteer_count(),
        })
        .collect();
    popular.sort_by(|a, b| match b.volunteer_count.cmp(&a.volunteer_count) {
        Ordering::Equal => a.title.cmp(&b.title),
        other => other,
    });
    popular.truncate(TOP_PARTICIPATION);

    ParticipationMetrics {
        average_volunteers_per_opportunity: rows.iter().map(|p| p.volunteer_count() as f64).sum::<f64>() / count,
        average_hours_per_opportunity: rows.iter().map(|p| p.total_hours).sum::<f64>() / count,
        most_popular_opportunities: popular,
        highest_hour_opportunities: top_n(
            rows.iter().map(|p| (p.title.clone(), p.total_hours)),
            TOP_PARTICIPATION,
        ),
    }
}
