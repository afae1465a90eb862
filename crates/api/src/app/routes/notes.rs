use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::dto::{self, ContactNotesRequest, SupportCallsResponse};
use crate::app::errors;
use crate::app::services::AppServices;

/// POST /api/query-contact-notes
pub async fn query_contact_notes(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<ContactNotesRequest>,
) -> axum::response::Response {
    if req.action != "query-support-calls" {
        return errors::unknown_action(&req.action);
    }

    let fy = match dto::interval_from(req.fiscal_year_start.as_deref(), req.fiscal_year_end.as_deref()) {
        Ok(fy) => fy,
        Err(resp) => return resp,
    };

    match services
        .aggregator
        .support_calls(&fy, req.selected_staff.as_deref().unwrap_or_default())
        .await
    {
        Ok(summary) => Json(SupportCallsResponse {
            success: true,
            total_calls: summary.total_calls,
            calls_by_staff: summary.calls_by_staff,
            staff_list: summary.staff_list,
        })
        .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}
