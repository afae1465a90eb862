//! Typed access to the reporting backend.
//!
//! Every accessor performs exactly one request. Transport failures and
//! non-2xx statuses are errors; a 2xx body whose `success` flag is missing or
//! false means "no data" and yields the default value (logged). The two
//! progress steps (`sync_batch`, `refresh_dates`) report "no data" as
//! [`ClientError::NoData`] instead, so a poll loop never mistakes a zeroed
//! body for progress.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};

use famreport_core::{Contact, DashboardMetrics, FiscalYear, SupportCallSummary, YoyRow};

use crate::error::ClientError;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";

const SYNC_PATH: &str = "/api/sync-patient-families";

/// Progress record as reported by `get-state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncStateBody {
    pub last_synced_contact_count: u64,
    pub total_known: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSnapshot {
    pub sync_state: SyncStateBody,
    pub total_contacts: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchStatus {
    pub cached_count: u64,
    pub next_skip: u64,
    pub total_contacts: u64,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetStatus {
    pub next_skip: u64,
    pub cached_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshStatus {
    pub next_offset: u64,
    pub total_cached: u64,
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FamiliesPage {
    pub families: Vec<Contact>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClearedCounts {
    pub families: u64,
    pub sync_states: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClearCacheBody {
    deleted: ClearedCounts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YoyBody {
    data: Vec<YoyRow>,
}

/// Where widget values come from.
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    async fn dashboard(&self, fy: &FiscalYear) -> Result<DashboardMetrics, ClientError>;
}

#[async_trait::async_trait]
impl<S> MetricsSource for Arc<S>
where
    S: MetricsSource + ?Sized,
{
    async fn dashboard(&self, fy: &FiscalYear) -> Result<DashboardMetrics, ClientError> {
        (**self).dashboard(fy).await
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `FAMREPORT_BACKEND_URL`, defaulting to the local backend.
    pub fn from_env() -> Self {
        let url = std::env::var("FAMREPORT_BACKEND_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        Self::new(url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_body(res: reqwest::Response) -> Result<JsonValue, ClientError> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<JsonValue>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(JsonValue::as_str).map(String::from))
                .unwrap_or(body);
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(res.json().await?)
    }

    /// Decode a `{success, ...}` body; `None` when the backend had no data.
    fn decode_success<T: DeserializeOwned>(what: &str, body: JsonValue) -> Result<Option<T>, ClientError> {
        if body.get("success").and_then(JsonValue::as_bool) != Some(true) {
            tracing::warn!(request = what, "backend reported no data");
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| ClientError::Decode(format!("{what}: {e}")))
    }

    async fn post_for<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
        payload: JsonValue,
    ) -> Result<Option<T>, ClientError> {
        let res = self.http.post(self.url(path)).json(&payload).send().await?;
        let body = Self::read_body(res).await?;
        Self::decode_success(what, body)
    }

    /// Unsuccessful bodies become `T::default()`.
    async fn post_action<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        what: &str,
        payload: JsonValue,
    ) -> Result<T, ClientError> {
        Ok(self.post_for(path, what, payload).await?.unwrap_or_default())
    }

    /// Unsuccessful bodies become [`ClientError::NoData`].
    async fn post_step<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
        payload: JsonValue,
    ) -> Result<T, ClientError> {
        self.post_for(path, what, payload)
            .await?
            .ok_or_else(|| ClientError::NoData(what.to_string()))
    }

    fn interval(fy: &FiscalYear) -> (String, String) {
        (fy.start_date.to_string(), fy.end_date.to_string())
    }

    pub async fn get_state(&self) -> Result<SyncSnapshot, ClientError> {
        self.post_action(SYNC_PATH, "get-state", json!({"action": "get-state"}))
            .await
    }

    pub async fn sync_batch(&self) -> Result<BatchStatus, ClientError> {
        self.post_step(SYNC_PATH, "sync", json!({"action": "sync"})).await
    }

    pub async fn reset_sync(&self) -> Result<ResetStatus, ClientError> {
        self.post_action(SYNC_PATH, "sync-reset", json!({"action": "sync", "reset": true}))
            .await
    }

    pub async fn refresh_dates(&self, offset: u64, batch_size: u64) -> Result<RefreshStatus, ClientError> {
        self.post_step(
            SYNC_PATH,
            "refresh-dates",
            json!({"action": "refresh-dates", "offset": offset, "batchSize": batch_size}),
        )
        .await
    }

    pub async fn yoy_comparison(&self) -> Result<Vec<YoyRow>, ClientError> {
        let body: YoyBody = self
            .post_action(SYNC_PATH, "yoy-comparison", json!({"action": "yoy-comparison"}))
            .await?;
        Ok(body.data)
    }

    /// Support calls in `fy`; an empty `staff` selection counts everyone.
    pub async fn support_calls(
        &self,
        fy: &FiscalYear,
        staff: &[String],
    ) -> Result<SupportCallSummary, ClientError> {
        let (start, end) = Self::interval(fy);
        self.post_action(
            "/api/query-contact-notes",
            "query-support-calls",
            json!({
                "action": "query-support-calls",
                "fiscalYearStart": start,
                "fiscalYearEnd": end,
                "selectedStaff": staff,
            }),
        )
        .await
    }

    pub async fn patient_families(
        &self,
        skip: u64,
        limit: u64,
        search: Option<&str>,
    ) -> Result<FamiliesPage, ClientError> {
        let mut query = vec![("skip", skip.to_string()), ("limit", limit.to_string())];
        if let Some(s) = search.filter(|s| !s.trim().is_empty()) {
            query.push(("search", s.to_string()));
        }
        let res = self
            .http
            .get(self.url("/api/patient-families"))
            .query(&query)
            .send()
            .await?;
        let body = Self::read_body(res).await?;
        serde_json::from_value(body).map_err(|e| ClientError::Decode(format!("patient-families: {e}")))
    }

    /// Every cached family, paging through the listing.
    pub async fn all_patient_families(&self, page_size: u64) -> Result<Vec<Contact>, ClientError> {
        let page_size = page_size.max(1);
        let mut out = Vec::new();
        loop {
            let page = self.patient_families(out.len() as u64, page_size, None).await?;
            let fetched = page.families.len();
            out.extend(page.families);
            if fetched == 0 || out.len() as u64 >= page.total {
                break;
            }
        }
        Ok(out)
    }

    pub async fn clear_backend_cache(&self) -> Result<ClearedCounts, ClientError> {
        let body: ClearCacheBody = self.post_action("/api/clear-cache", "clear-cache", json!({})).await?;
        Ok(body.deleted)
    }
}

#[async_trait::async_trait]
impl MetricsSource for BackendClient {
    async fn dashboard(&self, fy: &FiscalYear) -> Result<DashboardMetrics, ClientError> {
        let (start, end) = Self::interval(fy);
        self.post_action(
            SYNC_PATH,
            "dashboard",
            json!({"action": "dashboard", "fiscalYearStart": start, "fiscalYearEnd": end}),
        )
        .await
    }
}
