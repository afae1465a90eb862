//! Infrastructure layer: CRM access, local cache, sync, aggregation.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod crm;
pub mod enrich;
pub mod sync;

pub use aggregate::CacheAggregator;
pub use cache::{
    CacheError, ClearedCounts, ContactCache, Enrichment, FamilyQuery, InMemoryContactCache, SqliteContactCache,
    default_db_path,
};
pub use config::{CrmConfig, ResetTarget, SyncConfig};
pub use crm::{ContactSource, CrmError, InMemoryContactSource, RawRequest, VirtuousClient};
pub use enrich::DetailEnricher;
pub use sync::{BatchOutcome, RefreshOutcome, ResetOutcome, SyncCoordinator, SyncError};
