use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use famreport_infra::{
    CacheAggregator, ContactCache, ContactSource, InMemoryContactCache, SqliteContactCache, SyncConfig,
    SyncCoordinator, VirtuousClient,
};

use crate::config::{ApiConfig, CacheBackend};

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub source: Arc<dyn ContactSource>,
    pub cache: Arc<dyn ContactCache>,
    pub sync: SyncCoordinator,
    pub aggregator: CacheAggregator,
    pub sync_config: SyncConfig,
}

impl AppServices {
    pub fn new(
        source: Arc<dyn ContactSource>,
        cache: Arc<dyn ContactCache>,
        tag_id: i64,
        sync_config: SyncConfig,
    ) -> Self {
        Self {
            sync: SyncCoordinator::new(source.clone(), cache.clone(), tag_id, sync_config.clone()),
            aggregator: CacheAggregator::new(cache.clone()),
            source,
            cache,
            sync_config,
        }
    }
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let cache: Arc<dyn ContactCache> = match &config.cache {
        CacheBackend::InMemory => {
            tracing::info!("using in-memory cache");
            Arc::new(InMemoryContactCache::new())
        }
        CacheBackend::Sqlite(url) => {
            if let Some(path) = url.strip_prefix("sqlite://") {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
            }
            tracing::info!(database_url = %url, "using SQLite cache");
            Arc::new(
                SqliteContactCache::connect(url)
                    .await
                    .with_context(|| format!("failed to open cache database {url}"))?,
            )
        }
    };

    let source: Arc<dyn ContactSource> = Arc::new(VirtuousClient::new(&config.crm));
    Ok(AppServices::new(source, cache, config.crm.tag_id, config.sync.clone()))
}

/// Sync progress notices as server-sent events. Lagged notices are skipped.
pub fn sync_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.sync.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(notice) => {
            let data = serde_json::to_string(&notice).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(notice.event_name()).data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
