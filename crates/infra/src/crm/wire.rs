//! CRM JSON shapes and their conversion into cached records.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use famreport_core::{Contact, ContactId, ContactNote, Engagement};

/// Accepts the date spellings the CRM emits: RFC 3339 instants, naive
/// date-times, plain dates, and `MM/DD/YYYY`.
pub fn parse_crm_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTag {
    Named { name: String },
    Plain(String),
}

impl WireTag {
    fn into_name(self) -> String {
        match self {
            WireTag::Named { name } | WireTag::Plain(name) => name,
        }
    }
}

fn tag_names(tags: Vec<WireTag>) -> BTreeSet<String> {
    tags.into_iter().map(WireTag::into_name).collect()
}

/// Entry of `/Contact/ByTag/{tag}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContact {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<WireTag>,
}

impl From<WireContact> for Contact {
    fn from(w: WireContact) -> Self {
        let mut c = Contact::new(ContactId::new(w.id), w.name.unwrap_or_default());
        c.contact_type = w.contact_type;
        c.created_date = w.created_date.as_deref().and_then(parse_crm_date);
        c.tags = tag_names(w.tags);
        c
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireContactPage {
    #[serde(default)]
    pub list: Vec<WireContact>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireContactMethod {
    #[serde(rename = "type", default)]
    pub method_type: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIndividual {
    #[serde(default)]
    pub contact_methods: Vec<WireContactMethod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAddress {
    pub address1: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal: Option<String>,
}

impl WireAddress {
    /// `address1, city, state, postal` with blanks skipped.
    pub fn one_line(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.address1, &self.city, &self.state, &self.postal]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCustomField {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// `/Contact/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContactDetail {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub create_date_time_utc: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<WireTag>,
    #[serde(default)]
    pub contact_individuals: Vec<WireIndividual>,
    #[serde(default)]
    pub address: Option<WireAddress>,
    #[serde(default)]
    pub custom_fields: Vec<WireCustomField>,
}

impl WireContactDetail {
    fn primary_method(&self, kind: &str) -> Option<String> {
        self.contact_individuals
            .first()?
            .contact_methods
            .iter()
            .find(|m| m.method_type.to_lowercase().contains(kind))
            .map(|m| m.value.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn diagnosis_date(&self) -> Option<NaiveDate> {
        self.custom_fields
            .iter()
            .filter(|f| f.name.to_lowercase().contains("diagnosis"))
            .find_map(|f| f.value.as_deref().and_then(parse_crm_date))
    }
}

impl From<WireContactDetail> for Contact {
    fn from(w: WireContactDetail) -> Self {
        let email = w.primary_method("email");
        let phone = w.primary_method("phone");
        let address = w.address.as_ref().and_then(WireAddress::one_line);
        let diagnosis_date = w.diagnosis_date();

        let mut c = Contact::new(ContactId::new(w.id), w.name.unwrap_or_default());
        c.contact_type = w.contact_type;
        c.created_date = w
            .create_date_time_utc
            .as_deref()
            .or(w.created_date.as_deref())
            .and_then(parse_crm_date);
        c.tags = tag_names(w.tags);
        c.email = email;
        c.phone = phone;
        c.address = address;
        c.diagnosis_date = diagnosis_date;
        c
    }
}

/// Either a bare array or a `{list: [...]}` page; the CRM uses both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireList<T> {
    Bare(Vec<T>),
    Paged { list: Vec<T> },
}

impl<T> WireList<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            WireList::Bare(v) | WireList::Paged { list: v } => v,
        }
    }
}

/// Row of the "Family Engagement" custom collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEngagement {
    #[serde(default, alias = "engagementDate")]
    pub date: Option<String>,
    #[serde(default, alias = "type")]
    pub engagement_type: Option<String>,
}

impl WireEngagement {
    /// Rows without a usable date are dropped.
    pub fn into_engagement(self, contact_id: ContactId) -> Option<Engagement> {
        let date = self.date.as_deref().and_then(parse_crm_date)?;
        Some(Engagement {
            contact_id,
            date,
            engagement_type: self
                .engagement_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Other".to_string()),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNote {
    #[serde(rename = "type", default)]
    pub note_type: String,
    #[serde(default)]
    pub note_date: Option<String>,
    #[serde(default)]
    pub create_date_time_utc: Option<String>,
    #[serde(default)]
    pub created_by_user: Option<String>,
}

impl WireNote {
    /// Dated by `noteDate`, falling back to the creation instant.
    pub fn into_note(self, contact_id: ContactId) -> Option<ContactNote> {
        let date = self
            .note_date
            .as_deref()
            .or(self.create_date_time_utc.as_deref())
            .and_then(parse_crm_date)?;
        Some(ContactNote {
            contact_id,
            date,
            note_type: self.note_type,
            staff: self.created_by_user.filter(|s| !s.trim().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_crm_date_spellings() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 5);
        assert_eq!(parse_crm_date("2024-11-05T14:03:00Z"), expected);
        assert_eq!(parse_crm_date("2024-11-05T14:03:00.123"), expected);
        assert_eq!(parse_crm_date("2024-11-05"), expected);
        assert_eq!(parse_crm_date("11/05/2024"), expected);
        assert_eq!(parse_crm_date("soon"), None);
    }

    #[test]
    fn detail_folds_methods_address_and_diagnosis() {
        let w: WireContactDetail = serde_json::from_value(json!({
            "id": 9,
            "name": "Nguyen Family",
            "createDateTimeUtc": "2023-12-01T08:00:00Z",
            "tags": [{"id": 25, "name": "Patient Family"}],
            "contactIndividuals": [{
                "contactMethods": [
                    {"type": "Home Phone", "value": "555-0100"},
                    {"type": "Home Email", "value": "n@example.org"}
                ]
            }],
            "address": {"address1": "4 Pine Rd", "city": "Macon", "state": "GA", "postal": "31201"},
            "customFields": [{"name": "Diagnosis Date", "value": "2024-02-14"}]
        }))
        .unwrap();

        let c = Contact::from(w);
        assert_eq!(c.email.as_deref(), Some("n@example.org"));
        assert_eq!(c.phone.as_deref(), Some("555-0100"));
        assert_eq!(c.address.as_deref(), Some("4 Pine Rd, Macon, GA, 31201"));
        assert_eq!(c.diagnosis_date, NaiveDate::from_ymd_opt(2024, 2, 14));
        assert_eq!(c.created_date, NaiveDate::from_ymd_opt(2023, 12, 1));
        assert!(c.tags.contains("Patient Family"));
    }

    #[test]
    fn lists_come_bare_or_paged() {
        let bare: WireList<WireEngagement> =
            serde_json::from_value(json!([{"date": "2025-01-01", "type": "Webinar"}])).unwrap();
        let paged: WireList<WireEngagement> =
            serde_json::from_value(json!({"list": [{"date": "2025-01-01"}]})).unwrap();

        let e = bare.into_vec().remove(0).into_engagement(ContactId::new(1)).unwrap();
        assert_eq!(e.engagement_type, "Webinar");
        let e = paged.into_vec().remove(0).into_engagement(ContactId::new(1)).unwrap();
        assert_eq!(e.engagement_type, "Other");
    }

    #[test]
    fn undated_rows_are_dropped() {
        let w = WireEngagement {
            date: None,
            engagement_type: Some("Webinar".into()),
        };
        assert!(w.into_engagement(ContactId::new(1)).is_none());
    }
}
