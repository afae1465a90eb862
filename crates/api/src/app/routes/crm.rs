use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use famreport_infra::{ContactSource, RawRequest};

use crate::app::errors;
use crate::app::services::AppServices;

/// POST /api/virtuous-api
///
/// Forwards a raw call to the CRM with the server-held key.
pub async fn proxy(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<RawRequest>,
) -> axum::response::Response {
    tracing::debug!(endpoint = %req.endpoint, method = %req.method, "proxying CRM call");
    match services.source.raw(req).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => errors::crm_error_to_response(e),
    }
}
