//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// CRM-assigned contact identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(i64);

impl ContactId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for ContactId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for ContactId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for ContactId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("ContactId: {e}")))
    }
}

/// Client-generated identifier of a custom widget.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(Uuid);

impl WidgetId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered), so widgets sort by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WidgetId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for WidgetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for WidgetId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s.trim().trim_start_matches("widget-"))
            .map_err(|e| DomainError::invalid_id(format!("WidgetId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_ids_are_v7_and_distinct() {
        let a = WidgetId::new();
        let b = WidgetId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn widget_id_parses_with_or_without_prefix() {
        let id = WidgetId::new();
        assert_eq!(id.to_string().parse::<WidgetId>().unwrap(), id);
        assert_eq!(format!("widget-{id}").parse::<WidgetId>().unwrap(), id);
        assert!("nope".parse::<WidgetId>().is_err());
    }

    #[test]
    fn contact_id_parses_integers() {
        assert_eq!("42".parse::<ContactId>().unwrap(), ContactId::new(42));
        assert!(matches!("x".parse::<ContactId>(), Err(DomainError::InvalidId(_))));
    }
}
