//! Records mirrored from the CRM.
//!
//! These are read-only copies. The only writers are the sync pass (upsert)
//! and the date refresh pass (engagement rows, notes, derived dates).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fiscal::{FiscalYear, is_within};
use crate::id::ContactId;

/// A patient family as cached from the CRM tag listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub created_date: Option<NaiveDate>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub last_engagement_date: Option<NaiveDate>,
    #[serde(default)]
    pub diagnosis_date: Option<NaiveDate>,
}

impl Contact {
    pub fn new(id: ContactId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            contact_type: None,
            created_date: None,
            email: None,
            phone: None,
            address: None,
            tags: BTreeSet::new(),
            last_engagement_date: None,
            diagnosis_date: None,
        }
    }

    /// Merge a fresh copy from the tag listing into this cached record.
    ///
    /// Listing fields are overwritten; contact details are only replaced when
    /// the listing carries them; dates derived by the refresh pass are kept.
    pub fn absorb_listing(&mut self, listed: Contact) {
        self.name = listed.name;
        self.contact_type = listed.contact_type;
        self.created_date = listed.created_date.or(self.created_date);
        self.tags = listed.tags;
        self.email = listed.email.or(self.email.take());
        self.phone = listed.phone.or(self.phone.take());
        self.address = listed.address.or(self.address.take());
    }

    pub fn created_within(&self, fy: &FiscalYear) -> bool {
        self.created_date.is_some_and(|d| is_within(d, fy))
    }

    pub fn diagnosed_within(&self, fy: &FiscalYear) -> bool {
        self.diagnosis_date.is_some_and(|d| is_within(d, fy))
    }

    /// Row shape used by the metric family lists.
    pub fn summary(&self, engagement_date: Option<NaiveDate>) -> FamilySummary {
        FamilySummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            created_date: self.created_date,
            engagement_date,
        }
    }
}

/// One row of the CRM "Family Engagement" custom collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub contact_id: ContactId,
    pub date: NaiveDate,
    pub engagement_type: String,
}

/// A CRM note attached to a contact (support calls are notes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactNote {
    pub contact_id: ContactId,
    pub date: NaiveDate,
    pub note_type: String,
    #[serde(default)]
    pub staff: Option<String>,
}

impl ContactNote {
    /// Support calls are notes whose type mentions "call".
    pub fn is_support_call(&self) -> bool {
        self.note_type.to_lowercase().contains("call")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilySummary {
    pub id: ContactId,
    pub name: String,
    pub email: Option<String>,
    pub created_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_and_diagnosis_windows() {
        let fy = FiscalYear::starting(2024).unwrap();
        let mut c = Contact::new(ContactId::new(1), "Rivera Family");
        assert!(!c.created_within(&fy));

        c.created_date = NaiveDate::from_ymd_opt(2024, 10, 1);
        c.diagnosis_date = NaiveDate::from_ymd_opt(2024, 9, 30);
        assert!(c.created_within(&fy));
        assert!(!c.diagnosed_within(&fy));
    }

    #[test]
    fn listing_merge_keeps_refreshed_dates() {
        let mut cached = Contact::new(ContactId::new(3), "Old Name");
        cached.email = Some("a@example.org".to_string());
        cached.last_engagement_date = NaiveDate::from_ymd_opt(2025, 2, 2);

        let mut listed = Contact::new(ContactId::new(3), "New Name");
        listed.tags.insert("Patient Family".to_string());
        cached.absorb_listing(listed);

        assert_eq!(cached.name, "New Name");
        assert_eq!(cached.email.as_deref(), Some("a@example.org"));
        assert_eq!(cached.last_engagement_date, NaiveDate::from_ymd_opt(2025, 2, 2));
        assert!(cached.tags.contains("Patient Family"));
    }

    #[test]
    fn support_calls_match_case_insensitively() {
        let note = |t: &str| ContactNote {
            contact_id: ContactId::new(1),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            note_type: t.to_string(),
            staff: None,
        };
        assert!(note("Phone Call").is_support_call());
        assert!(note("CALL").is_support_call());
        assert!(!note("Email").is_support_call());
    }

    #[test]
    fn summary_serializes_camel_case() {
        let mut c = Contact::new(ContactId::new(7), "Lee");
        c.created_date = NaiveDate::from_ymd_opt(2023, 3, 4);
        let json = serde_json::to_value(c.summary(None)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["createdDate"], "2023-03-04");
        assert!(json.get("engagementDate").is_none());
    }
}
