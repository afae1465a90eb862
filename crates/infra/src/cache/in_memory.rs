//! In-memory cache for tests/dev.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use famreport_core::{Contact, ContactId, ContactNote, Engagement, SyncProgress};

use super::{CacheError, ClearedCounts, ContactCache, Enrichment, FamilyQuery, fold_name};

#[derive(Debug, Default)]
struct State {
    contacts: BTreeMap<ContactId, Contact>,
    engagements: Vec<Engagement>,
    notes: Vec<ContactNote>,
    progress: Option<SyncProgress>,
}

#[derive(Debug, Default)]
pub struct InMemoryContactCache {
    state: RwLock<State>,
}

impl InMemoryContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, CacheError> {
        self.state
            .read()
            .map_err(|_| CacheError::Storage("cache lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, CacheError> {
        self.state
            .write()
            .map_err(|_| CacheError::Storage("cache lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ContactCache for InMemoryContactCache {
    async fn read_progress(&self) -> Result<Option<SyncProgress>, CacheError> {
        Ok(self.read()?.progress)
    }

    async fn write_progress(&self, progress: SyncProgress) -> Result<(), CacheError> {
        self.write()?.progress = Some(progress);
        Ok(())
    }

    async fn upsert_contacts(&self, contacts: &[Contact]) -> Result<(), CacheError> {
        let mut state = self.write()?;
        for incoming in contacts {
            match state.contacts.get_mut(&incoming.id) {
                Some(existing) => existing.absorb_listing(incoming.clone()),
                None => {
                    state.contacts.insert(incoming.id, incoming.clone());
                }
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64, CacheError> {
        Ok(self.read()?.contacts.len() as u64)
    }

    async fn list_families(&self, query: &FamilyQuery) -> Result<(Vec<Contact>, u64), CacheError> {
        let state = self.read()?;
        let needle = query.needle();

        let mut matches: Vec<&Contact> = state
            .contacts
            .values()
            .filter(|c| match &needle {
                Some(n) => fold_name(&c.name).contains(n),
                None => true,
            })
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn slice_by_id(&self, offset: u64, limit: u64) -> Result<Vec<Contact>, CacheError> {
        Ok(self
            .read()?
            .contacts
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn record_enrichment(&self, id: ContactId, enrichment: &Enrichment) -> Result<(), CacheError> {
        let mut state = self.write()?;
        let Some(contact) = state.contacts.get_mut(&id) else {
            return Ok(());
        };
        enrichment.apply_to(contact);

        state.engagements.retain(|e| e.contact_id != id);
        state.engagements.extend(enrichment.engagements.iter().cloned());
        state.notes.retain(|n| n.contact_id != id);
        state.notes.extend(enrichment.notes.iter().cloned());
        Ok(())
    }

    async fn all_contacts(&self) -> Result<Vec<Contact>, CacheError> {
        Ok(self.read()?.contacts.values().cloned().collect())
    }

    async fn all_engagements(&self) -> Result<Vec<Engagement>, CacheError> {
        Ok(self.read()?.engagements.clone())
    }

    async fn all_notes(&self) -> Result<Vec<ContactNote>, CacheError> {
        Ok(self.read()?.notes.clone())
    }

    async fn clear(&self) -> Result<ClearedCounts, CacheError> {
        let mut state = self.write()?;
        let cleared = ClearedCounts {
            families: state.contacts.len() as u64,
            sync_states: u64::from(state.progress.is_some()),
        };
        *state = State::default();
        Ok(cleared)
    }
}
