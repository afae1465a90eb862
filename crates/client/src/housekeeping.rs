//! Cache clearing across the backend and local storage.

use chrono::{SecondsFormat, Utc};

use crate::api::{BackendClient, ClearedCounts};
use crate::error::ClientError;
use crate::prefs::LocalStore;
use crate::widgets::WIDGETS_KEY;

pub const LAST_CLEARED_KEY: &str = "lastCacheCleared";

/// Clear the backend cache, then drop every local key except the widget
/// list, then stamp [`LAST_CLEARED_KEY`] with the current time.
///
/// Local storage is only touched once the backend call succeeded.
pub async fn clear_cache(client: &BackendClient, storage: &LocalStore) -> Result<ClearedCounts, ClientError> {
    let deleted = client.clear_backend_cache().await?;
    clear_local(storage)?;
    tracing::info!(
        families = deleted.families,
        sync_states = deleted.sync_states,
        "cache cleared"
    );
    Ok(deleted)
}

fn clear_local(storage: &LocalStore) -> Result<(), ClientError> {
    storage.retain(|key| key == WIDGETS_KEY)?;
    storage.set(LAST_CLEARED_KEY, Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn keeps_widgets_and_stamps_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clear-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Cache cleared successfully",
                "deleted": {"families": 12, "sync_states": 1},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStore::open(dir.path().join("local_storage.json"));
        storage.set(WIDGETS_KEY, "[]").unwrap();
        storage.set("dashboardCache", "{}").unwrap();

        let deleted = clear_cache(&BackendClient::new(server.uri()), &storage).await.unwrap();
        assert_eq!(deleted.families, 12);

        let mut keys = storage.keys();
        keys.sort();
        assert_eq!(keys, vec![WIDGETS_KEY.to_string(), LAST_CLEARED_KEY.to_string()]);
        let stamp = storage.get(LAST_CLEARED_KEY).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[tokio::test]
    async fn backend_failure_leaves_local_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clear-cache"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": "cache_error",
                "message": "disk full",
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStore::open(dir.path().join("local_storage.json"));
        storage.set("dashboardCache", "{}").unwrap();

        assert!(clear_cache(&BackendClient::new(server.uri()), &storage).await.is_err());
        assert_eq!(storage.keys(), vec!["dashboardCache".to_string()]);
    }
}
