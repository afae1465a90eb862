//! Dashboard metric shapes.
//!
//! These are the JSON bodies the backend returns and the client reads back,
//! so every struct is `camelCase` on the wire and defaults missing fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::contact::FamilySummary;
use crate::taxonomy::{EngagementKind, SupportCategory};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupportTypes {
    pub butterfly_fund: u64,
    pub uber_program: u64,
    pub ride_for_kids: u64,
    pub peer_support: u64,
    pub webinars: u64,
}

impl SupportTypes {
    pub fn get(&self, category: SupportCategory) -> u64 {
        match category {
            SupportCategory::ButterflyFund => self.butterfly_fund,
            SupportCategory::UberProgram => self.uber_program,
            SupportCategory::RideForKids => self.ride_for_kids,
            SupportCategory::PeerSupport => self.peer_support,
            SupportCategory::Webinars => self.webinars,
        }
    }

    pub fn add(&mut self, category: SupportCategory, n: u64) {
        let slot = match category {
            SupportCategory::ButterflyFund => &mut self.butterfly_fund,
            SupportCategory::UberProgram => &mut self.uber_program,
            SupportCategory::RideForKids => &mut self.ride_for_kids,
            SupportCategory::PeerSupport => &mut self.peer_support,
            SupportCategory::Webinars => &mut self.webinars,
        };
        *slot += n;
    }

    /// Categorize a label→count breakdown. Unclassified labels are dropped.
    pub fn from_engagement_types(engagement_types: &BTreeMap<String, u64>) -> Self {
        let mut out = Self::default();
        for (label, count) in engagement_types {
            if let Some(category) = SupportCategory::classify(label) {
                out.add(category, *count);
            }
        }
        out
    }

    pub fn total(&self) -> u64 {
        SupportCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// One month of the fiscal-year trend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonthlyRow {
    pub month: String,
    pub butterfly_fund: u64,
    pub uber_program: u64,
    pub ride_for_kids: u64,
    pub peer_support: u64,
    pub webinars: u64,
    /// Engagements that fit none of the locked categories.
    pub other: u64,
    pub new_families: u64,
    pub newly_diagnosed: u64,
    pub total_engagements: u64,
}

impl MonthlyRow {
    pub fn count_engagement(&mut self, category: Option<SupportCategory>) {
        match category {
            Some(SupportCategory::ButterflyFund) => self.butterfly_fund += 1,
            Some(SupportCategory::UberProgram) => self.uber_program += 1,
            Some(SupportCategory::RideForKids) => self.ride_for_kids += 1,
            Some(SupportCategory::PeerSupport) => self.peer_support += 1,
            Some(SupportCategory::Webinars) => self.webinars += 1,
            None => self.other += 1,
        }
        self.total_engagements += 1;
    }
}

/// Year-over-year comparison row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct YoyRow {
    pub fiscal_year: String,
    pub engaged: u64,
    pub newly_diagnosed: u64,
    pub new_families: u64,
    pub first_time_engaged: u64,
    pub re_engaged: u64,
    pub total_engagements: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupportCallSummary {
    pub total_calls: u64,
    pub calls_by_staff: BTreeMap<String, u64>,
    /// Every staff member with at least one call in the interval, sorted,
    /// regardless of the staff filter.
    pub staff_list: Vec<String>,
}

/// Everything the main dashboard shows for one fiscal year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardMetrics {
    pub total_families: u64,
    pub analyzed_families: u64,
    pub total_in_fiscal_year: u64,
    pub engaged_count: u64,
    pub not_engaged_count: u64,
    pub newly_diagnosed_count: u64,
    pub new_families_count: u64,
    pub first_time_engaged_count: u64,
    pub re_engaged_count: u64,
    pub families_reached: u64,
    pub engagement_types: BTreeMap<String, u64>,
    pub support_types: SupportTypes,
    pub total_interactions: u64,
    pub monthly_data: Vec<MonthlyRow>,
    pub engaged_families: Vec<FamilySummary>,
    pub newly_diagnosed_families: Vec<FamilySummary>,
    pub new_families: Vec<FamilySummary>,
    pub first_time_engaged_families: Vec<FamilySummary>,
    pub re_engaged_families: Vec<FamilySummary>,
}

impl DashboardMetrics {
    /// Count attributed to a widget kind.
    pub fn value_for(&self, kind: EngagementKind) -> u64 {
        kind.value_in(&self.engagement_types)
    }
}
