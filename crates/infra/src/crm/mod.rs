//! Remote contact source (the CRM).
//!
//! [`ContactSource`] is the seam the sync pass talks to. [`VirtuousClient`]
//! is the HTTP implementation; [`InMemoryContactSource`] backs tests and
//! local development.

mod in_memory;
mod virtuous;
pub mod wire;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use famreport_core::{Contact, ContactId, ContactNote, Engagement};

pub use in_memory::InMemoryContactSource;
pub use virtuous::VirtuousClient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrmError {
    #[error("CRM API key not configured")]
    NotConfigured,

    #[error("network error: {0}")]
    Network(String),

    #[error("CRM API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
}

/// One page of the tag listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactPage {
    pub contacts: Vec<Contact>,
    /// Size of the whole listing as reported by the CRM.
    pub total: u64,
}

/// A raw call forwarded to the CRM on behalf of a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub body: Option<JsonValue>,
    #[serde(default)]
    pub query_params: Option<BTreeMap<String, String>>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[async_trait::async_trait]
pub trait ContactSource: Send + Sync {
    /// Contacts carrying `tag_id`, newest first, `take` at a time from `skip`.
    async fn list_by_tag(&self, tag_id: i64, skip: u64, take: u64) -> Result<ContactPage, CrmError>;

    /// Full record with contact methods, address and custom fields folded in.
    async fn contact_detail(&self, id: ContactId) -> Result<Contact, CrmError>;

    /// Rows of the "Family Engagement" custom collection.
    async fn family_engagements(&self, id: ContactId) -> Result<Vec<Engagement>, CrmError>;

    async fn contact_notes(&self, id: ContactId) -> Result<Vec<ContactNote>, CrmError>;

    async fn raw(&self, request: RawRequest) -> Result<JsonValue, CrmError>;
}

#[async_trait::async_trait]
impl<S> ContactSource for Arc<S>
where
    S: ContactSource + ?Sized,
{
    async fn list_by_tag(&self, tag_id: i64, skip: u64, take: u64) -> Result<ContactPage, CrmError> {
        (**self).list_by_tag(tag_id, skip, take).await
    }

    async fn contact_detail(&self, id: ContactId) -> Result<Contact, CrmError> {
        (**self).contact_detail(id).await
    }

    async fn family_engagements(&self, id: ContactId) -> Result<Vec<Engagement>, CrmError> {
        (**self).family_engagements(id).await
    }

    async fn contact_notes(&self, id: ContactId) -> Result<Vec<ContactNote>, CrmError> {
        (**self).contact_notes(id).await
    }

    async fn raw(&self, request: RawRequest) -> Result<JsonValue, CrmError> {
        (**self).raw(request).await
    }
}
