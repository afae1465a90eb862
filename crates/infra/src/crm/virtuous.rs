//! HTTP client for the Virtuous CRM REST API.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use famreport_core::{Contact, ContactId, ContactNote, Engagement};

use super::wire::{WireContactDetail, WireContactPage, WireEngagement, WireList, WireNote};
use super::{ContactPage, ContactSource, CrmError, RawRequest};
use crate::config::CrmConfig;

pub const ENGAGEMENT_COLLECTION: &str = "Family Engagement";

/// Bearer-authenticated CRM client. Never retries; callers decide.
#[derive(Debug, Clone)]
pub struct VirtuousClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl VirtuousClient {
    pub fn new(config: &CrmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder, CrmError> {
        let key = self.api_key.as_deref().ok_or(CrmError::NotConfigured)?;
        let url = format!("{}{}", self.base_url, endpoint);
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(key)
            .header("Content-Type", "application/json"))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, CrmError> {
        let resp = req
            .send()
            .await
            .map_err(|e| CrmError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "CRM request failed");
            return Err(CrmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // Some endpoints answer 204 / empty bodies.
        if status == StatusCode::NO_CONTENT {
            return serde_json::from_value(JsonValue::Null).map_err(|e| CrmError::Parse(e.to_string()));
        }

        resp.json::<T>()
            .await
            .map_err(|e| CrmError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl ContactSource for VirtuousClient {
    async fn list_by_tag(&self, tag_id: i64, skip: u64, take: u64) -> Result<ContactPage, CrmError> {
        let req = self
            .request(Method::GET, &format!("/Contact/ByTag/{tag_id}"))?
            .query(&[
                ("skip", skip.to_string()),
                ("take", take.to_string()),
                ("sortBy", "Id".to_string()),
                ("descending", "true".to_string()),
            ]);

        let page: WireContactPage = self.send(req).await?;
        tracing::debug!(skip, take, fetched = page.list.len(), total = page.total, "fetched tag page");

        Ok(ContactPage {
            contacts: page.list.into_iter().map(Contact::from).collect(),
            total: page.total,
        })
    }

    async fn contact_detail(&self, id: ContactId) -> Result<Contact, CrmError> {
        let req = self.request(Method::GET, &format!("/Contact/{id}"))?;
        let detail: WireContactDetail = self.send(req).await?;
        Ok(Contact::from(detail))
    }

    async fn family_engagements(&self, id: ContactId) -> Result<Vec<Engagement>, CrmError> {
        let req = self.request(
            Method::GET,
            &format!("/Contact/{id}/CustomCollections/{ENGAGEMENT_COLLECTION}"),
        )?;
        let rows: Option<WireList<WireEngagement>> = self.send(req).await?;
        Ok(rows
            .map(WireList::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.into_engagement(id))
            .collect())
    }

    async fn contact_notes(&self, id: ContactId) -> Result<Vec<ContactNote>, CrmError> {
        let req = self.request(Method::GET, &format!("/Contact/{id}/ContactNotes"))?;
        let rows: Option<WireList<WireNote>> = self.send(req).await?;
        Ok(rows
            .map(WireList::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.into_note(id))
            .collect())
    }

    async fn raw(&self, request: RawRequest) -> Result<JsonValue, CrmError> {
        let method = match request.method.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            other => return Err(CrmError::UnsupportedMethod(other.to_string())),
        };
        let sends_body = method == Method::POST || method == Method::PUT;

        let mut req = self.request(method, &request.endpoint)?;
        if let Some(params) = &request.query_params {
            req = req.query(params);
        }
        if sends_body {
            if let Some(body) = &request.body {
                req = req.json(body);
            }
        }

        let value: Option<JsonValue> = self.send(req).await?;
        Ok(value.unwrap_or(JsonValue::Null))
    }
}
