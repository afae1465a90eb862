//! Sync actions, the families listing and cache clearing.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    response::IntoResponse,
};
use chrono::Utc;

use famreport_infra::{ContactCache, FamilyQuery};

use crate::app::dto::{
    self, ClearCacheResponse, DashboardResponse, FamiliesQuery, FamiliesResponse, GetStateResponse,
    RefreshDatesResponse, SyncActionRequest, SyncBatchResponse, SyncResetResponse, SyncStateBody, YoyResponse,
};
use crate::app::errors;
use crate::app::services::AppServices;

/// POST /api/sync-patient-families
///
/// Dispatches on `action`: `dashboard`, `get-state`, `sync` (optionally with
/// `reset: true`), `refresh-dates`, `yoy-comparison`.
pub async fn sync_action(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<SyncActionRequest>,
) -> axum::response::Response {
    match req.action.as_str() {
        "dashboard" => dashboard(&services, &req).await,
        "get-state" => get_state(&services).await,
        "sync" if req.reset => reset(&services).await,
        "sync" => run_batch(&services).await,
        "refresh-dates" => refresh_dates(&services, &req).await,
        "yoy-comparison" => yoy(&services).await,
        other => errors::unknown_action(other),
    }
}

async fn dashboard(services: &AppServices, req: &SyncActionRequest) -> axum::response::Response {
    let fy = match dto::interval_from(req.fiscal_year_start.as_deref(), req.fiscal_year_end.as_deref()) {
        Ok(fy) => fy,
        Err(resp) => return resp,
    };

    match services.aggregator.dashboard(&fy).await {
        Ok(metrics) => Json(DashboardResponse {
            success: true,
            metrics,
        })
        .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

async fn get_state(services: &AppServices) -> axum::response::Response {
    match services.sync.get_state().await {
        Ok(state) => Json(GetStateResponse {
            success: true,
            sync_state: SyncStateBody {
                last_synced_contact_count: state.processed_offset,
                total_known: state.total,
            },
            total_contacts: state.cached_count,
        })
        .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

async fn run_batch(services: &AppServices) -> axum::response::Response {
    match services.sync.run_batch().await {
        Ok(outcome) => Json(SyncBatchResponse {
            success: true,
            cached_count: outcome.cached_count,
            next_skip: outcome.next_offset,
            total_contacts: outcome.total_known,
            complete: outcome.complete,
        })
        .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

async fn reset(services: &AppServices) -> axum::response::Response {
    match services.sync.reset().await {
        Ok(outcome) => Json(SyncResetResponse {
            success: true,
            next_skip: outcome.next_offset,
            cached_count: outcome.cached_count,
        })
        .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

async fn refresh_dates(services: &AppServices, req: &SyncActionRequest) -> axum::response::Response {
    let offset = req.offset.unwrap_or(0);
    let batch_size = req.batch_size.unwrap_or(services.sync_config.batch_size);

    match services.sync.refresh_dates(offset, batch_size).await {
        Ok(outcome) => Json(RefreshDatesResponse {
            success: true,
            next_offset: outcome.next_offset,
            total_cached: outcome.total_cached,
            complete: outcome.complete,
        })
        .into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

async fn yoy(services: &AppServices) -> axum::response::Response {
    match services.aggregator.yoy_comparison(Utc::now().date_naive()).await {
        Ok(data) => Json(YoyResponse { success: true, data }).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

/// GET /api/patient-families?skip&limit&search
pub async fn list_families(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<FamiliesQuery>,
) -> axum::response::Response {
    let query = FamilyQuery {
        skip: q.skip,
        limit: q.limit,
        search: q.search,
    };
    match services.cache.list_families(&query).await {
        Ok((families, total)) => Json(FamiliesResponse { families, total }).into_response(),
        Err(e) => errors::cache_error_to_response(e),
    }
}

/// POST /api/clear-cache
pub async fn clear_cache(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.cache.clear().await {
        Ok(deleted) => {
            tracing::info!(families = deleted.families, "cache cleared on request");
            Json(ClearCacheResponse {
                success: true,
                message: "Cache cleared successfully".to_string(),
                deleted,
            })
            .into_response()
        }
        Err(e) => errors::cache_error_to_response(e),
    }
}
