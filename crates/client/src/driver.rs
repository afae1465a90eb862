//! Poll loops that drive the backend sync and the date refresh to completion.
//!
//! Each loop issues one request per tick and checks the caller's
//! [`CancelFlag`] before scheduling the next one. A request already in flight
//! is allowed to finish. Failed requests, including "no data" answers, are
//! retried on the next tick from the same position and are never reported
//! as progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::api::{BackendClient, BatchStatus, RefreshStatus};
use crate::error::ClientError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REFRESH_BATCH: u64 = 50;

/// Shared stop signal for a running loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub poll_interval: Duration,
    /// Give up after this many failures in a row; `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
    pub refresh_batch_size: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: None,
            refresh_batch_size: DEFAULT_REFRESH_BATCH,
        }
    }
}

/// How a loop ended.
#[derive(Debug)]
pub enum DriverOutcome<T> {
    Completed(T),
    /// Stopped by the cancel flag; carries the last successful step, if any.
    Cancelled(Option<T>),
    GaveUp(ClientError),
}

/// The two backend calls the loops need.
#[async_trait::async_trait]
pub trait SyncBackend: Send + Sync {
    async fn sync_batch(&self) -> Result<BatchStatus, ClientError>;

    async fn refresh_dates(&self, offset: u64, batch_size: u64) -> Result<RefreshStatus, ClientError>;
}

#[async_trait::async_trait]
impl SyncBackend for BackendClient {
    async fn sync_batch(&self) -> Result<BatchStatus, ClientError> {
        BackendClient::sync_batch(self).await
    }

    async fn refresh_dates(&self, offset: u64, batch_size: u64) -> Result<RefreshStatus, ClientError> {
        BackendClient::refresh_dates(self, offset, batch_size).await
    }
}

/// Counts consecutive failures against the configured cap.
struct Failures {
    count: u32,
    cap: Option<u32>,
}

impl Failures {
    /// Record a failure; returns the error back when the cap is reached.
    fn record(&mut self, step: &str, err: ClientError) -> Option<ClientError> {
        self.count += 1;
        tracing::warn!(step, failures = self.count, error = %err, "request failed; retrying next tick");
        match self.cap {
            Some(cap) if self.count >= cap => Some(err),
            _ => None,
        }
    }
}

/// Call `sync` until the backend reports completion.
pub async fn run_sync<B, F>(
    backend: &B,
    config: &DriverConfig,
    cancel: &CancelFlag,
    mut on_progress: F,
) -> DriverOutcome<BatchStatus>
where
    B: SyncBackend + ?Sized,
    F: FnMut(&BatchStatus),
{
    let mut last = None;
    let mut failures = Failures {
        count: 0,
        cap: config.max_consecutive_failures,
    };

    loop {
        if cancel.is_cancelled() {
            tracing::info!("sync loop cancelled");
            return DriverOutcome::Cancelled(last);
        }

        match backend.sync_batch().await {
            Ok(status) => {
                failures.count = 0;
                on_progress(&status);
                if status.complete {
                    tracing::info!(cached = status.cached_count, "sync complete");
                    return DriverOutcome::Completed(status);
                }
                last = Some(status);
            }
            Err(e) => {
                if let Some(e) = failures.record("sync", e) {
                    return DriverOutcome::GaveUp(e);
                }
            }
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

/// Walk the date refresh across every cached record, starting at `offset`.
pub async fn run_refresh<B, F>(
    backend: &B,
    config: &DriverConfig,
    cancel: &CancelFlag,
    mut offset: u64,
    mut on_progress: F,
) -> DriverOutcome<RefreshStatus>
where
    B: SyncBackend + ?Sized,
    F: FnMut(&RefreshStatus),
{
    let mut last = None;
    let mut failures = Failures {
        count: 0,
        cap: config.max_consecutive_failures,
    };

    loop {
        if cancel.is_cancelled() {
            tracing::info!(offset, "date refresh cancelled");
            return DriverOutcome::Cancelled(last);
        }

        match backend.refresh_dates(offset, config.refresh_batch_size).await {
            Ok(status) => {
                failures.count = 0;
                on_progress(&status);
                if status.complete {
                    tracing::info!(total = status.total_cached, "date refresh complete");
                    return DriverOutcome::Completed(status);
                }
                offset = status.next_offset;
                last = Some(status);
            }
            Err(e) => {
                if let Some(e) = failures.record("refresh-dates", e) {
                    return DriverOutcome::GaveUp(e);
                }
            }
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays scripted results; records refresh offsets.
    #[derive(Default)]
    struct Scripted {
        batches: Mutex<VecDeque<Result<BatchStatus, ClientError>>>,
        refreshes: Mutex<VecDeque<Result<RefreshStatus, ClientError>>>,
        offsets: Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl SyncBackend for Scripted {
        async fn sync_batch(&self) -> Result<BatchStatus, ClientError> {
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Network("script exhausted".into())))
        }

        async fn refresh_dates(&self, offset: u64, _batch_size: u64) -> Result<RefreshStatus, ClientError> {
            self.offsets.lock().unwrap().push(offset);
            self.refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Network("script exhausted".into())))
        }
    }

    fn fast() -> DriverConfig {
        DriverConfig {
            poll_interval: Duration::from_millis(1),
            ..DriverConfig::default()
        }
    }

    fn batch(next: u64, complete: bool) -> Result<BatchStatus, ClientError> {
        Ok(BatchStatus {
            cached_count: next,
            next_skip: next,
            total_contacts: 120,
            complete,
        })
    }

    #[tokio::test]
    async fn retries_failed_batch_then_completes() {
        let backend = Scripted::default();
        backend.batches.lock().unwrap().extend([
            batch(50, false),
            Err(ClientError::Network("reset by peer".into())),
            batch(100, false),
            batch(120, true),
        ]);

        let mut seen = Vec::new();
        let outcome = run_sync(&backend, &fast(), &CancelFlag::new(), |s| seen.push(s.next_skip)).await;

        assert!(matches!(outcome, DriverOutcome::Completed(ref s) if s.cached_count == 120));
        assert_eq!(seen, vec![50, 100, 120]);
    }

    #[tokio::test]
    async fn cancelled_flag_stops_before_next_request() {
        let backend = Scripted::default();
        backend.batches.lock().unwrap().extend([batch(50, false), batch(100, false)]);

        let cancel = CancelFlag::new();
        let stopper = cancel.clone();
        let outcome = run_sync(&backend, &fast(), &cancel, move |_| stopper.cancel()).await;

        assert!(matches!(outcome, DriverOutcome::Cancelled(Some(ref s)) if s.next_skip == 50));
        assert_eq!(backend.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_cap() {
        let backend = Scripted::default();
        let config = DriverConfig {
            max_consecutive_failures: Some(3),
            ..fast()
        };

        let outcome = run_sync(&backend, &config, &CancelFlag::new(), |_| {}).await;
        assert!(matches!(outcome, DriverOutcome::GaveUp(ClientError::Network(_))));
    }

    #[tokio::test]
    async fn refresh_advances_offsets() {
        let backend = Scripted::default();
        backend.refreshes.lock().unwrap().extend([
            Ok(RefreshStatus {
                next_offset: 50,
                total_cached: 80,
                complete: false,
            }),
            Ok(RefreshStatus {
                next_offset: 80,
                total_cached: 80,
                complete: true,
            }),
        ]);

        let outcome = run_refresh(&backend, &fast(), &CancelFlag::new(), 0, |_| {}).await;
        assert!(matches!(outcome, DriverOutcome::Completed(_)));
        assert_eq!(*backend.offsets.lock().unwrap(), vec![0, 50]);
    }

    #[tokio::test]
    async fn no_data_keeps_refresh_offset_and_skips_progress() {
        let backend = Scripted::default();
        backend.refreshes.lock().unwrap().extend([
            Ok(RefreshStatus {
                next_offset: 50,
                total_cached: 80,
                complete: false,
            }),
            Err(ClientError::NoData("refresh-dates".into())),
            Ok(RefreshStatus {
                next_offset: 80,
                total_cached: 80,
                complete: true,
            }),
        ]);

        let mut reported = Vec::new();
        let outcome = run_refresh(&backend, &fast(), &CancelFlag::new(), 0, |s| reported.push(s.next_offset)).await;

        assert!(matches!(outcome, DriverOutcome::Completed(_)));
        assert_eq!(*backend.offsets.lock().unwrap(), vec![0, 50, 50]);
        assert_eq!(reported, vec![50, 80]);
    }

    #[tokio::test]
    async fn repeated_no_data_gives_up_at_cap() {
        let backend = Scripted::default();
        backend
            .batches
            .lock()
            .unwrap()
            .extend((0..3).map(|_| Err(ClientError::NoData("sync".into()))));
        let config = DriverConfig {
            max_consecutive_failures: Some(3),
            ..fast()
        };

        let mut progress_calls = 0;
        let outcome = run_sync(&backend, &config, &CancelFlag::new(), |_| progress_calls += 1).await;
        assert!(matches!(outcome, DriverOutcome::GaveUp(ClientError::NoData(_))));
        assert_eq!(progress_calls, 0);
    }
}
