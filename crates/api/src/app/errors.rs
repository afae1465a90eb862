use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use famreport_infra::{CacheError, CrmError, SyncError};

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::Crm(e) => crm_error_to_response(e),
        SyncError::Cache(e) => cache_error_to_response(e),
        SyncError::Domain(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    }
}

pub fn crm_error_to_response(err: CrmError) -> axum::response::Response {
    match err {
        CrmError::NotConfigured => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "crm_not_configured",
            "VIRTUOUS_API_KEY is not configured",
        ),
        CrmError::UnsupportedMethod(method) => json_error(
            StatusCode::BAD_REQUEST,
            "unsupported_method",
            format!("unsupported method: {method}"),
        ),
        other => {
            tracing::warn!(error = %other, "CRM request failed");
            json_error(StatusCode::BAD_GATEWAY, "crm_error", other.to_string())
        }
    }
}

pub fn cache_error_to_response(err: CacheError) -> axum::response::Response {
    tracing::error!(error = %err, "cache failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "cache_error", err.to_string())
}

pub fn unknown_action(action: &str) -> axum::response::Response {
    json_error(
        StatusCode::BAD_REQUEST,
        "unknown_action",
        format!("unknown action: {action:?}"),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
