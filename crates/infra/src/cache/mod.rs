//! Local cache of mirrored CRM records and sync progress.

mod in_memory;
mod sqlite;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use famreport_core::{Contact, ContactId, ContactNote, Engagement, SyncProgress};

pub use in_memory::InMemoryContactCache;
pub use sqlite::{SqliteContactCache, default_db_path};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt cache row: {0}")]
    Corrupt(String),
}

/// Page request for the families listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyQuery {
    pub skip: u64,
    pub limit: u64,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
}

impl FamilyQuery {
    pub(crate) fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(fold_name)
    }
}

/// Case folding shared by every backend's name search.
pub(crate) fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Everything the date refresh pass learned about one contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub engagements: Vec<Engagement>,
    pub notes: Vec<ContactNote>,
    pub last_engagement_date: Option<NaiveDate>,
    /// From the detail record, when it could be fetched.
    pub detail: Option<Contact>,
}

impl Enrichment {
    pub fn new(engagements: Vec<Engagement>, notes: Vec<ContactNote>, detail: Option<Contact>) -> Self {
        let last_engagement_date = engagements.iter().map(|e| e.date).max();
        Self {
            engagements,
            notes,
            last_engagement_date,
            detail,
        }
    }

    /// Apply to the cached record: derived dates and any contact details the
    /// detail fetch supplied.
    pub(crate) fn apply_to(&self, contact: &mut Contact) {
        if self.last_engagement_date.is_some() {
            contact.last_engagement_date = self.last_engagement_date;
        }
        if let Some(detail) = &self.detail {
            contact.email = detail.email.clone().or(contact.email.take());
            contact.phone = detail.phone.clone().or(contact.phone.take());
            contact.address = detail.address.clone().or(contact.address.take());
            contact.diagnosis_date = detail.diagnosis_date.or(contact.diagnosis_date);
            contact.created_date = contact.created_date.or(detail.created_date);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedCounts {
    pub families: u64,
    pub sync_states: u64,
}

#[async_trait::async_trait]
pub trait ContactCache: Send + Sync {
    /// `None` until the first sync batch wrote one.
    async fn read_progress(&self) -> Result<Option<SyncProgress>, CacheError>;

    async fn write_progress(&self, progress: SyncProgress) -> Result<(), CacheError>;

    /// Insert new records, merge listing fields into existing ones.
    async fn upsert_contacts(&self, contacts: &[Contact]) -> Result<(), CacheError>;

    async fn count(&self) -> Result<u64, CacheError>;

    /// Name-ordered page plus the number of matches.
    async fn list_families(&self, query: &FamilyQuery) -> Result<(Vec<Contact>, u64), CacheError>;

    /// Records `[offset, offset + limit)` in ascending id order.
    async fn slice_by_id(&self, offset: u64, limit: u64) -> Result<Vec<Contact>, CacheError>;

    /// Replace engagement rows and notes for `id` and update derived fields.
    /// Unknown ids are ignored.
    async fn record_enrichment(&self, id: ContactId, enrichment: &Enrichment) -> Result<(), CacheError>;

    async fn all_contacts(&self) -> Result<Vec<Contact>, CacheError>;

    async fn all_engagements(&self) -> Result<Vec<Engagement>, CacheError>;

    async fn all_notes(&self) -> Result<Vec<ContactNote>, CacheError>;

    /// Drop records, engagements, notes and the progress record.
    async fn clear(&self) -> Result<ClearedCounts, CacheError>;
}

#[async_trait::async_trait]
impl<C> ContactCache for Arc<C>
where
    C: ContactCache + ?Sized,
{
    async fn read_progress(&self) -> Result<Option<SyncProgress>, CacheError> {
        (**self).read_progress().await
    }

    async fn write_progress(&self, progress: SyncProgress) -> Result<(), CacheError> {
        (**self).write_progress(progress).await
    }

    async fn upsert_contacts(&self, contacts: &[Contact]) -> Result<(), CacheError> {
        (**self).upsert_contacts(contacts).await
    }

    async fn count(&self) -> Result<u64, CacheError> {
        (**self).count().await
    }

    async fn list_families(&self, query: &FamilyQuery) -> Result<(Vec<Contact>, u64), CacheError> {
        (**self).list_families(query).await
    }

    async fn slice_by_id(&self, offset: u64, limit: u64) -> Result<Vec<Contact>, CacheError> {
        (**self).slice_by_id(offset, limit).await
    }

    async fn record_enrichment(&self, id: ContactId, enrichment: &Enrichment) -> Result<(), CacheError> {
        (**self).record_enrichment(id, enrichment).await
    }

    async fn all_contacts(&self) -> Result<Vec<Contact>, CacheError> {
        (**self).all_contacts().await
    }

    async fn all_engagements(&self) -> Result<Vec<Engagement>, CacheError> {
        (**self).all_engagements().await
    }

    async fn all_notes(&self) -> Result<Vec<ContactNote>, CacheError> {
        (**self).all_notes().await
    }

    async fn clear(&self) -> Result<ClearedCounts, CacheError> {
        (**self).clear().await
    }
}
