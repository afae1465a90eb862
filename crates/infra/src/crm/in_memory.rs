//! In-memory contact source for tests/dev.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use serde_json::{Value as JsonValue, json};

use famreport_core::{Contact, ContactId, ContactNote, Engagement};

use super::{ContactPage, ContactSource, CrmError, RawRequest};

/// Serves a fixed listing (in listing order) plus per-contact engagements and
/// notes. Failures can be injected per contact or for the next listing call,
/// and every listing request is recorded.
#[derive(Debug, Default)]
pub struct InMemoryContactSource {
    listing: RwLock<Vec<Contact>>,
    engagements: RwLock<HashMap<ContactId, Vec<Engagement>>>,
    notes: RwLock<HashMap<ContactId, Vec<ContactNote>>>,
    failing_contacts: RwLock<BTreeSet<ContactId>>,
    fail_next_listing: Mutex<Option<CrmError>>,
    listing_calls: Mutex<Vec<(u64, u64)>>,
}

impl InMemoryContactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contacts(contacts: Vec<Contact>) -> Self {
        let source = Self::default();
        source.set_contacts(contacts);
        source
    }

    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        if let Ok(mut listing) = self.listing.write() {
            *listing = contacts;
        }
    }

    pub fn add_engagements(&self, rows: Vec<Engagement>) {
        if let Ok(mut map) = self.engagements.write() {
            for row in rows {
                map.entry(row.contact_id).or_default().push(row);
            }
        }
    }

    pub fn add_notes(&self, rows: Vec<ContactNote>) {
        if let Ok(mut map) = self.notes.write() {
            for row in rows {
                map.entry(row.contact_id).or_default().push(row);
            }
        }
    }

    /// Make every per-contact call for `id` fail.
    pub fn fail_contact(&self, id: ContactId) {
        if let Ok(mut set) = self.failing_contacts.write() {
            set.insert(id);
        }
    }

    /// Make the next `list_by_tag` call fail with `error`.
    pub fn fail_next_listing(&self, error: CrmError) {
        if let Ok(mut slot) = self.fail_next_listing.lock() {
            *slot = Some(error);
        }
    }

    /// `(skip, take)` of every listing request so far.
    pub fn listing_calls(&self) -> Vec<(u64, u64)> {
        self.listing_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn check_contact(&self, id: ContactId) -> Result<(), CrmError> {
        let failing = self
            .failing_contacts
            .read()
            .map(|set| set.contains(&id))
            .unwrap_or(false);
        if failing {
            return Err(CrmError::Api {
                status: 500,
                body: format!("contact {id} unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContactSource for InMemoryContactSource {
    async fn list_by_tag(&self, _tag_id: i64, skip: u64, take: u64) -> Result<ContactPage, CrmError> {
        if let Ok(mut calls) = self.listing_calls.lock() {
            calls.push((skip, take));
        }
        if let Some(err) = self.fail_next_listing.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(err);
        }

        let listing = self
            .listing
            .read()
            .map_err(|_| CrmError::Network("listing lock poisoned".to_string()))?;

        Ok(ContactPage {
            contacts: listing
                .iter()
                .skip(skip as usize)
                .take(take as usize)
                .cloned()
                .collect(),
            total: listing.len() as u64,
        })
    }

    async fn contact_detail(&self, id: ContactId) -> Result<Contact, CrmError> {
        self.check_contact(id)?;
        self.listing
            .read()
            .ok()
            .and_then(|listing| listing.iter().find(|c| c.id == id).cloned())
            .ok_or(CrmError::Api {
                status: 404,
                body: format!("contact {id} not found"),
            })
    }

    async fn family_engagements(&self, id: ContactId) -> Result<Vec<Engagement>, CrmError> {
        self.check_contact(id)?;
        Ok(self
            .engagements
            .read()
            .ok()
            .and_then(|map| map.get(&id).cloned())
            .unwrap_or_default())
    }

    async fn contact_notes(&self, id: ContactId) -> Result<Vec<ContactNote>, CrmError> {
        self.check_contact(id)?;
        Ok(self
            .notes
            .read()
            .ok()
            .and_then(|map| map.get(&id).cloned())
            .unwrap_or_default())
    }

    /// Echoes the request back; there is no remote API to forward to.
    async fn raw(&self, request: RawRequest) -> Result<JsonValue, CrmError> {
        Ok(json!({
            "endpoint": request.endpoint,
            "method": request.method,
            "body": request.body,
            "queryParams": request.query_params,
        }))
    }
}
