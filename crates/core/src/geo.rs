//! US-state grouping of cached families by mailing address.

use std::collections::BTreeMap;

use crate::contact::Contact;

/// Two-letter codes for the 50 states and DC, with display names.
pub const STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("DC", "District of Columbia"),
];

pub fn state_name(code: &str) -> Option<&'static str> {
    STATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// State code of an address.
///
/// Only the first standalone two-letter uppercase token is considered; if it
/// is not a known code (e.g. `PO Box ...`) the address has no state.
pub fn extract_state(address: &str) -> Option<&'static str> {
    let token = address
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .find(|t| t.len() == 2 && t.bytes().all(|b| b.is_ascii_uppercase()))?;

    STATES
        .iter()
        .find(|(code, _)| *code == token)
        .map(|(code, _)| *code)
}

/// Families keyed by state code. Families without a recognizable state are
/// left out.
pub fn group_by_state(families: &[Contact]) -> BTreeMap<&'static str, Vec<Contact>> {
    let mut groups: BTreeMap<&'static str, Vec<Contact>> = BTreeMap::new();
    for family in families {
        if let Some(state) = family.address.as_deref().and_then(extract_state) {
            groups.entry(state).or_default().push(family.clone());
        }
    }
    groups
}

/// Per-state counts, largest first (ties by code).
pub fn state_counts(groups: &BTreeMap<&'static str, Vec<Contact>>) -> Vec<(&'static str, usize)> {
    let mut counts: Vec<_> = groups.iter().map(|(s, f)| (*s, f.len())).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    counts
}
