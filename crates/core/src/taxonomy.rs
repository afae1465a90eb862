//! Engagement taxonomy.
//!
//! Two classifications live here:
//!
//! - [`SupportCategory`]: the five locked KPI categories shown on the main
//!   dashboard, assigned by keyword rules.
//! - [`EngagementKind`]: the fourteen kinds a custom widget can track,
//!   assigned by the versioned [`MAPPING`] table first and by substring
//!   containment only for labels the table does not claim.

use std::collections::BTreeMap;

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Bump when [`MAPPING`] changes meaning.
pub const MAPPING_VERSION: u32 = 1;

/// Locked dashboard categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SupportCategory {
    ButterflyFund,
    UberProgram,
    RideForKids,
    PeerSupport,
    Webinars,
}

impl SupportCategory {
    pub const ALL: [SupportCategory; 5] = [
        SupportCategory::ButterflyFund,
        SupportCategory::UberProgram,
        SupportCategory::RideForKids,
        SupportCategory::PeerSupport,
        SupportCategory::Webinars,
    ];

    /// Keyword classification of a CRM engagement label. First rule wins.
    pub fn classify(label: &str) -> Option<SupportCategory> {
        let t = label.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| t.contains(w));

        if any(&["butterfly", "fund"]) {
            Some(SupportCategory::ButterflyFund)
        } else if any(&["uber", "lyft", "transportation"]) {
            Some(SupportCategory::UberProgram)
        } else if any(&["ride for kids", "rideforkids"]) {
            Some(SupportCategory::RideForKids)
        } else if any(&["peer", "connection", "mentor"]) {
            Some(SupportCategory::PeerSupport)
        } else if any(&["webinar", "education", "workshop"]) {
            Some(SupportCategory::Webinars)
        } else {
            None
        }
    }
}

/// Engagement kinds selectable for a custom widget.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    ButterflyFund,
    UberProgram,
    RideForKids,
    PeerSupport,
    Webinars,
    Education,
    Workshops,
    Counseling,
    FinancialAssistance,
    Transportation,
    Lodging,
    SupportGroups,
    Mentorship,
    Other,
}

impl EngagementKind {
    pub const ALL: [EngagementKind; 14] = [
        EngagementKind::ButterflyFund,
        EngagementKind::UberProgram,
        EngagementKind::RideForKids,
        EngagementKind::PeerSupport,
        EngagementKind::Webinars,
        EngagementKind::Education,
        EngagementKind::Workshops,
        EngagementKind::Counseling,
        EngagementKind::FinancialAssistance,
        EngagementKind::Transportation,
        EngagementKind::Lodging,
        EngagementKind::SupportGroups,
        EngagementKind::Mentorship,
        EngagementKind::Other,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EngagementKind::ButterflyFund => "butterfly_fund",
            EngagementKind::UberProgram => "uber_program",
            EngagementKind::RideForKids => "ride_for_kids",
            EngagementKind::PeerSupport => "peer_support",
            EngagementKind::Webinars => "webinars",
            EngagementKind::Education => "education",
            EngagementKind::Workshops => "workshops",
            EngagementKind::Counseling => "counseling",
            EngagementKind::FinancialAssistance => "financial_assistance",
            EngagementKind::Transportation => "transportation",
            EngagementKind::Lodging => "lodging",
            EngagementKind::SupportGroups => "support_groups",
            EngagementKind::Mentorship => "mentorship",
            EngagementKind::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EngagementKind::ButterflyFund => "Butterfly Fund",
            EngagementKind::UberProgram => "Uber/Lyft Program",
            EngagementKind::RideForKids => "Ride for Kids",
            EngagementKind::PeerSupport => "Peer-to-Peer Support",
            EngagementKind::Webinars => "Webinars",
            EngagementKind::Education => "Educational Programs",
            EngagementKind::Workshops => "Workshops",
            EngagementKind::Counseling => "Counseling Services",
            EngagementKind::FinancialAssistance => "Financial Assistance",
            EngagementKind::Transportation => "Transportation Services",
            EngagementKind::Lodging => "Lodging Assistance",
            EngagementKind::SupportGroups => "Support Groups",
            EngagementKind::Mentorship => "Mentorship Programs",
            EngagementKind::Other => "Other Services",
        }
    }

    /// Substring rule used for labels the mapping table does not claim:
    /// the key (underscores read as spaces) and the label are compared
    /// case-insensitively, containment in either direction.
    pub fn loosely_matches(&self, source_label: &str) -> bool {
        let key = self.key().replace('_', " ");
        let label = source_label.to_lowercase();
        !label.is_empty() && (label.contains(&key) || key.contains(&label))
    }

    /// Sum of the counts in `engagement_types` attributed to this kind.
    pub fn value_in(&self, engagement_types: &BTreeMap<String, u64>) -> u64 {
        engagement_types
            .iter()
            .filter(|(label, _)| match mapped_kind(label) {
                Some(kind) => kind == *self,
                None => self.loosely_matches(label),
            })
            .map(|(_, count)| *count)
            .sum()
    }
}

impl core::fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EngagementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        EngagementKind::ALL
            .into_iter()
            .find(|k| k.key() == needle || k.label().to_lowercase() == needle)
            .ok_or_else(|| DomainError::validation(format!("unknown engagement type: {s:?}")))
    }
}

/// Known CRM engagement labels, compared case-insensitively.
pub const MAPPING: &[(&str, EngagementKind)] = &[
    ("Butterfly Fund", EngagementKind::ButterflyFund),
    ("Uber Program", EngagementKind::UberProgram),
    ("Lyft Program", EngagementKind::UberProgram),
    ("Uber/Lyft Program", EngagementKind::UberProgram),
    ("Ride for Kids", EngagementKind::RideForKids),
    ("Peer Support", EngagementKind::PeerSupport),
    ("Peer-to-Peer Support", EngagementKind::PeerSupport),
    ("Peer Connection", EngagementKind::PeerSupport),
    ("Webinar", EngagementKind::Webinars),
    ("Webinars", EngagementKind::Webinars),
    ("Education Webinar", EngagementKind::Webinars),
    ("Educational Program", EngagementKind::Education),
    ("Educational Programs", EngagementKind::Education),
    ("Workshop", EngagementKind::Workshops),
    ("Workshops", EngagementKind::Workshops),
    ("Counseling", EngagementKind::Counseling),
    ("Counseling Services", EngagementKind::Counseling),
    ("Financial Assistance", EngagementKind::FinancialAssistance),
    ("Transportation", EngagementKind::Transportation),
    ("Transportation Services", EngagementKind::Transportation),
    ("Lodging", EngagementKind::Lodging),
    ("Lodging Assistance", EngagementKind::Lodging),
    ("Support Group", EngagementKind::SupportGroups),
    ("Support Groups", EngagementKind::SupportGroups),
    ("Mentorship", EngagementKind::Mentorship),
    ("Mentorship Program", EngagementKind::Mentorship),
    ("Other", EngagementKind::Other),
];

/// The kind the mapping table assigns to `source_label`, if any.
pub fn mapped_kind(source_label: &str) -> Option<EngagementKind> {
    let label = source_label.trim();
    MAPPING
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(label))
        .map(|(_, kind)| *kind)
}
