//! Per-contact detail enrichment with bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use famreport_core::{Contact, ContactId};

use crate::cache::Enrichment;
use crate::crm::{ContactSource, CrmError};

/// Fetches engagement rows, notes and detail for a slice of cached contacts.
///
/// Requests go out `concurrency` at a time; the enricher sleeps `delay`
/// between chunks to stay under the CRM rate limit.
pub struct DetailEnricher {
    source: Arc<dyn ContactSource>,
    concurrency: usize,
    delay: Duration,
}

impl DetailEnricher {
    pub fn new(source: Arc<dyn ContactSource>, concurrency: usize, delay: Duration) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            delay,
        }
    }

    /// Enrich `contacts`. Contacts whose engagements or notes could not be
    /// fetched are logged and left out of the result.
    pub async fn enrich(&self, contacts: &[Contact]) -> Vec<(ContactId, Enrichment)> {
        let mut out = Vec::with_capacity(contacts.len());

        for (i, chunk) in contacts.chunks(self.concurrency).enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let mut set = JoinSet::new();
            for contact in chunk {
                let source = self.source.clone();
                let id = contact.id;
                set.spawn(async move { (id, enrich_one(source.as_ref(), id).await) });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((id, Ok(enrichment))) => out.push((id, enrichment)),
                    Ok((id, Err(e))) => {
                        tracing::warn!(contact_id = %id, error = %e, "skipping contact during date refresh");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "enrichment task failed");
                    }
                }
            }
        }

        out.sort_by_key(|(id, _)| *id);
        out
    }
}

async fn enrich_one(source: &dyn ContactSource, id: ContactId) -> Result<Enrichment, CrmError> {
    let engagements = source.family_engagements(id).await?;
    let notes = source.contact_notes(id).await?;

    let detail = match source.contact_detail(id).await {
        Ok(detail) => Some(detail),
        Err(e) => {
            tracing::debug!(contact_id = %id, error = %e, "contact detail unavailable");
            None
        }
    };

    Ok(Enrichment::new(engagements, notes, detail))
}
