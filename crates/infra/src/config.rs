//! Environment-driven configuration for the CRM client and the sync pass.

use core::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.virtuouscrm.com/api";
pub const DEFAULT_TAG_ID: i64 = 25;
pub const DEFAULT_BATCH_SIZE: u64 = 50;
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 3;
pub const DEFAULT_DETAIL_DELAY_MS: u64 = 300;

/// Parse `name` from the environment, falling back to `default` when unset
/// or unparsable (the latter is logged).
pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "ignoring unparsable setting");
                default
            }
        },
        _ => default,
    }
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// Bearer token; `None` leaves the client unconfigured.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Tag that marks patient families.
    pub tag_id: i64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            tag_id: DEFAULT_TAG_ID,
        }
    }
}

impl CrmConfig {
    /// `VIRTUOUS_API_KEY`, `VIRTUOUS_BASE_URL`, `PATIENT_FAMILY_TAG_ID`.
    pub fn from_env() -> Self {
        let api_key = std::env::var("VIRTUOUS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let base_url = std::env::var("VIRTUOUS_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            api_key,
            base_url,
            tag_id: env_or("PATIENT_FAMILY_TAG_ID", DEFAULT_TAG_ID),
        }
    }
}

/// Where `reset` rewinds the sync offset to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ResetTarget {
    /// Start over from the first record.
    #[default]
    Start,
    /// Resume from a fixed offset.
    Offset(u64),
}

impl ResetTarget {
    pub fn offset(&self) -> u64 {
        match self {
            ResetTarget::Start => 0,
            ResetTarget::Offset(n) => *n,
        }
    }
}

impl From<u64> for ResetTarget {
    fn from(offset: u64) -> Self {
        if offset == 0 {
            ResetTarget::Start
        } else {
            ResetTarget::Offset(offset)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub batch_size: u64,
    pub reset_target: ResetTarget,
    /// Detail fetches in flight per enrichment batch.
    pub detail_concurrency: usize,
    /// Pause between enrichment batches.
    pub detail_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            reset_target: ResetTarget::Start,
            detail_concurrency: DEFAULT_DETAIL_CONCURRENCY,
            detail_delay: Duration::from_millis(DEFAULT_DETAIL_DELAY_MS),
        }
    }
}

impl SyncConfig {
    /// `SYNC_BATCH_SIZE`, `SYNC_RESET_OFFSET`, `DETAIL_CONCURRENCY`,
    /// `DETAIL_DELAY_MS`.
    pub fn from_env() -> Self {
        Self {
            batch_size: env_or("SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            reset_target: ResetTarget::from(env_or("SYNC_RESET_OFFSET", 0u64)),
            detail_concurrency: env_or("DETAIL_CONCURRENCY", DEFAULT_DETAIL_CONCURRENCY).max(1),
            detail_delay: Duration::from_millis(env_or("DETAIL_DELAY_MS", DEFAULT_DETAIL_DELAY_MS)),
        }
    }
}
