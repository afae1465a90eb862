//! Sync progress bookkeeping.

use serde::{Deserialize, Serialize};

/// Persisted position of the resumable sync.
///
/// `total_known` is `None` until a batch has reported the CRM total (and again
/// after a reset). Once known, `last_processed_offset <= total_known`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub last_processed_offset: u64,
    pub total_known: Option<u64>,
    pub cached_count: u64,
}

impl SyncProgress {
    pub fn is_complete(&self) -> bool {
        self.total_known
            .is_some_and(|total| self.last_processed_offset >= total)
    }

    /// Position after a page of `fetched` records was merged, given the total
    /// the CRM reported with that page.
    ///
    /// An empty page means the source has nothing past the current offset, so
    /// the offset becomes the total. A completed sync has its offset clamped
    /// to the total.
    pub fn advance(&self, fetched: u64, reported_total: u64) -> SyncProgress {
        let mut next_offset = self.last_processed_offset + fetched;
        let total = if fetched == 0 {
            next_offset
        } else {
            reported_total
        };
        if next_offset >= total {
            next_offset = total;
        }

        SyncProgress {
            last_processed_offset: next_offset,
            total_known: Some(total),
            cached_count: self.cached_count,
        }
    }

    /// Rewind to `offset`, forgetting the known total.
    pub fn rewound_to(&self, offset: u64) -> SyncProgress {
        SyncProgress {
            last_processed_offset: offset,
            total_known: None,
            cached_count: self.cached_count,
        }
    }

    pub fn view(&self) -> SyncStateView {
        SyncStateView {
            processed_offset: self.last_processed_offset,
            total: self.total_known.unwrap_or(0),
            cached_count: self.cached_count,
        }
    }
}

/// Read-only snapshot handed to callers of `get_state`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateView {
    pub processed_offset: u64,
    pub total: u64,
    pub cached_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_progress_is_not_complete() {
        assert!(!SyncProgress::default().is_complete());
    }

    #[test]
    fn advancing_through_120_takes_three_pages() {
        let p = SyncProgress::default().advance(50, 120);
        assert_eq!(p.last_processed_offset, 50);
        assert!(!p.is_complete());

        let p = p.advance(50, 120);
        assert!(!p.is_complete());

        let p = p.advance(20, 120);
        assert_eq!(p.last_processed_offset, 120);
        assert!(p.is_complete());
    }

    #[test]
    fn offset_is_clamped_to_shrunken_total() {
        let p = SyncProgress {
            last_processed_offset: 100,
            total_known: Some(120),
            cached_count: 100,
        };
        let next = p.advance(10, 105);
        assert_eq!(next.last_processed_offset, 105);
        assert!(next.is_complete());
    }

    #[test]
    fn empty_page_completes() {
        let p = SyncProgress {
            last_processed_offset: 50,
            total_known: Some(120),
            cached_count: 50,
        };
        let next = p.advance(0, 120);
        assert_eq!(next.total_known, Some(50));
        assert!(next.is_complete());
    }

    #[test]
    fn rewind_forgets_total() {
        let p = SyncProgress::default().advance(20, 20).rewound_to(0);
        assert_eq!(p.total_known, None);
        assert!(!p.is_complete());
    }
}
