//! Resumable batch sync of tagged CRM contacts into the local cache.
//!
//! The coordinator owns the persisted [`SyncProgress`]. Each call does one
//! bounded unit of work and returns; callers drive the loop. A failed page
//! fetch leaves the progress untouched so the next call retries the same page.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};

use famreport_core::{DomainError, SyncProgress, SyncStateView};
use famreport_events::{SyncNotice, SyncStep};

use crate::cache::{CacheError, ContactCache};
use crate::config::SyncConfig;
use crate::crm::{ContactSource, CrmError};
use crate::enrich::DetailEnricher;

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Crm(#[from] CrmError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub cached_count: u64,
    pub next_offset: u64,
    pub total_known: u64,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub next_offset: u64,
    pub cached_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub next_offset: u64,
    pub total_cached: u64,
    pub complete: bool,
}

pub struct SyncCoordinator {
    source: Arc<dyn ContactSource>,
    cache: Arc<dyn ContactCache>,
    config: SyncConfig,
    tag_id: i64,
    enricher: DetailEnricher,
    /// Serializes batches and resets.
    gate: Mutex<()>,
    notices: broadcast::Sender<SyncNotice>,
}

impl SyncCoordinator {
    pub fn new(
        source: Arc<dyn ContactSource>,
        cache: Arc<dyn ContactCache>,
        tag_id: i64,
        config: SyncConfig,
    ) -> Self {
        let enricher = DetailEnricher::new(source.clone(), config.detail_concurrency, config.detail_delay);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            source,
            cache,
            config,
            tag_id,
            enricher,
            gate: Mutex::new(()),
            notices,
        }
    }

    pub fn cache(&self) -> &Arc<dyn ContactCache> {
        &self.cache
    }

    /// Progress notices; lagging receivers drop old ones.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: SyncNotice) {
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    pub async fn get_state(&self) -> Result<SyncStateView, SyncError> {
        match self.cache.read_progress().await? {
            Some(progress) => Ok(progress.view()),
            None => Ok(SyncStateView {
                cached_count: self.cache.count().await?,
                ..SyncStateView::default()
            }),
        }
    }

    /// Fetch and merge the next page of tagged contacts.
    pub async fn run_batch(&self) -> Result<BatchOutcome, SyncError> {
        let _guard = self.gate.lock().await;

        let progress = self.cache.read_progress().await?.unwrap_or_default();
        if progress.is_complete() {
            tracing::debug!(offset = progress.last_processed_offset, "sync already complete");
            return Ok(BatchOutcome {
                cached_count: progress.cached_count,
                next_offset: progress.last_processed_offset,
                total_known: progress.total_known.unwrap_or(progress.last_processed_offset),
                complete: true,
            });
        }

        let skip = progress.last_processed_offset;
        let page = self
            .source
            .list_by_tag(self.tag_id, skip, self.config.batch_size)
            .await?;
        let fetched = page.contacts.len() as u64;

        self.cache.upsert_contacts(&page.contacts).await?;

        let mut next = progress.advance(fetched, page.total);
        let total = next.total_known.unwrap_or(page.total);
        next.cached_count = self.cache.count().await?.min(total);
        self.cache.write_progress(next).await?;

        let outcome = BatchOutcome {
            cached_count: next.cached_count,
            next_offset: next.last_processed_offset,
            total_known: total,
            complete: next.is_complete(),
        };
        tracing::info!(
            skip,
            fetched,
            next_offset = outcome.next_offset,
            total = outcome.total_known,
            cached = outcome.cached_count,
            complete = outcome.complete,
            "sync batch merged"
        );
        self.notify(SyncNotice::new(
            SyncStep::Batch,
            outcome.next_offset,
            outcome.total_known,
            outcome.cached_count,
            outcome.complete,
        ));
        Ok(outcome)
    }

    /// Rewind the offset to the configured reset target. Cached records stay.
    pub async fn reset(&self) -> Result<ResetOutcome, SyncError> {
        let _guard = self.gate.lock().await;

        let progress = self.cache.read_progress().await?.unwrap_or_default();
        let mut next = progress.rewound_to(self.config.reset_target.offset());
        next.cached_count = self.cache.count().await?;
        self.cache.write_progress(next).await?;

        tracing::info!(offset = next.last_processed_offset, cached = next.cached_count, "sync reset");
        self.notify(SyncNotice::new(
            SyncStep::Reset,
            next.last_processed_offset,
            0,
            next.cached_count,
            false,
        ));
        Ok(ResetOutcome {
            next_offset: next.last_processed_offset,
            cached_count: next.cached_count,
        })
    }

    /// Refresh engagement rows, notes and derived dates for the cached
    /// records `[offset, offset + batch_size)` in id order.
    pub async fn refresh_dates(&self, offset: u64, batch_size: u64) -> Result<RefreshOutcome, SyncError> {
        let total_cached = self.cache.count().await?;
        let slice = self.cache.slice_by_id(offset, batch_size.max(1)).await?;

        let enriched = self.enricher.enrich(&slice).await;
        for (id, enrichment) in &enriched {
            self.cache.record_enrichment(*id, enrichment).await?;
        }

        let next_offset = offset + slice.len() as u64;
        let outcome = RefreshOutcome {
            next_offset,
            total_cached,
            complete: next_offset >= total_cached,
        };
        tracing::info!(
            offset,
            requested = slice.len(),
            refreshed = enriched.len(),
            next_offset,
            total_cached,
            "date refresh batch done"
        );
        self.notify(SyncNotice::new(
            SyncStep::RefreshDates,
            next_offset,
            total_cached,
            total_cached,
            outcome.complete,
        ));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use famreport_core::{Contact, ContactId, Engagement};

    use super::*;
    use crate::cache::InMemoryContactCache;
    use crate::config::ResetTarget;
    use crate::crm::InMemoryContactSource;

    fn families(n: i64) -> Vec<Contact> {
        (1..=n)
            .map(|i| Contact::new(ContactId::new(i), format!("Family {i:03}")))
            .collect()
    }

    fn config() -> SyncConfig {
        SyncConfig {
            detail_delay: Duration::ZERO,
            ..SyncConfig::default()
        }
    }

    fn coordinator(
        n: i64,
    ) -> (SyncCoordinator, Arc<InMemoryContactSource>, Arc<InMemoryContactCache>) {
        let source = Arc::new(InMemoryContactSource::with_contacts(families(n)));
        let cache = Arc::new(InMemoryContactCache::new());
        let coordinator = SyncCoordinator::new(source.clone(), cache.clone(), 25, config());
        (coordinator, source, cache)
    }

    #[tokio::test]
    async fn three_batches_for_120_contacts() {
        let (sync, source, _) = coordinator(120);

        let first = sync.run_batch().await.unwrap();
        assert_eq!((first.next_offset, first.complete), (50, false));
        let second = sync.run_batch().await.unwrap();
        assert_eq!((second.next_offset, second.complete), (100, false));
        let third = sync.run_batch().await.unwrap();
        assert_eq!(
            third,
            BatchOutcome {
                cached_count: 120,
                next_offset: 120,
                total_known: 120,
                complete: true,
            }
        );

        assert_eq!(source.listing_calls(), vec![(0, 50), (50, 50), (100, 50)]);
    }

    #[tokio::test]
    async fn completed_sync_is_a_no_op() {
        let (sync, source, _) = coordinator(10);
        sync.run_batch().await.unwrap();
        let calls_before = source.listing_calls().len();

        let again = sync.run_batch().await.unwrap();
        assert!(again.complete);
        assert_eq!(again.cached_count, 10);
        assert_eq!(source.listing_calls().len(), calls_before);
    }

    #[tokio::test]
    async fn resumes_from_persisted_offset() {
        let (sync, source, cache) = coordinator(80);
        cache
            .write_progress(SyncProgress {
                last_processed_offset: 30,
                total_known: Some(80),
                cached_count: 30,
            })
            .await
            .unwrap();

        sync.run_batch().await.unwrap();
        assert_eq!(source.listing_calls(), vec![(30, 50)]);
    }

    #[tokio::test]
    async fn failed_page_does_not_advance() {
        let (sync, source, cache) = coordinator(60);
        source.fail_next_listing(CrmError::Network("timeout".into()));

        let err = sync.run_batch().await.unwrap_err();
        assert!(matches!(err, SyncError::Crm(CrmError::Network(_))));
        assert_eq!(cache.read_progress().await.unwrap(), None);

        let retried = sync.run_batch().await.unwrap();
        assert_eq!(retried.next_offset, 50);
        assert_eq!(source.listing_calls(), vec![(0, 50), (0, 50)]);
    }

    #[tokio::test]
    async fn reset_rewinds_and_keeps_records() {
        let source = Arc::new(InMemoryContactSource::with_contacts(families(20)));
        let cache = Arc::new(InMemoryContactCache::new());
        let cfg = SyncConfig {
            reset_target: ResetTarget::Offset(5),
            ..config()
        };
        let sync = SyncCoordinator::new(source.clone(), cache.clone(), 25, cfg);
        assert!(sync.run_batch().await.unwrap().complete);

        let reset = sync.reset().await.unwrap();
        assert_eq!(reset, ResetOutcome { next_offset: 5, cached_count: 20 });

        let state = sync.get_state().await.unwrap();
        assert_eq!(state.processed_offset, 5);
        assert_eq!(state.total, 0);

        sync.run_batch().await.unwrap();
        assert_eq!(source.listing_calls().last(), Some(&(5, 50)));
    }

    #[tokio::test]
    async fn state_before_first_sync_reports_cached_rows() {
        let (sync, _, cache) = coordinator(3);
        cache.upsert_contacts(&families(2)).await.unwrap();

        let state = sync.get_state().await.unwrap();
        assert_eq!(
            state,
            SyncStateView {
                processed_offset: 0,
                total: 0,
                cached_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn refresh_dates_skips_failing_contacts() {
        let (sync, source, cache) = coordinator(5);
        sync.run_batch().await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        source.add_engagements(vec![
            Engagement {
                contact_id: ContactId::new(1),
                date: day,
                engagement_type: "Butterfly Fund".into(),
            },
            Engagement {
                contact_id: ContactId::new(2),
                date: day,
                engagement_type: "Webinar".into(),
            },
        ]);
        source.fail_contact(ContactId::new(2));

        let first = sync.refresh_dates(0, 3).await.unwrap();
        assert_eq!(
            first,
            RefreshOutcome {
                next_offset: 3,
                total_cached: 5,
                complete: false,
            }
        );
        let second = sync.refresh_dates(first.next_offset, 3).await.unwrap();
        assert!(second.complete);

        let stored = cache.slice_by_id(0, 2).await.unwrap();
        assert_eq!(stored[0].last_engagement_date, Some(day));
        assert_eq!(stored[1].last_engagement_date, None);
        assert_eq!(cache.all_engagements().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batches_publish_notices() {
        let (sync, _, _) = coordinator(70);
        let mut rx = sync.subscribe();

        sync.run_batch().await.unwrap();
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.step, SyncStep::Batch);
        assert_eq!(notice.next_offset, 50);
        assert!(!notice.complete);
    }
}
