use axum::http::StatusCode;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use famreport_core::fiscal::fiscal_year_for;
use famreport_core::{Contact, DashboardMetrics, FiscalYear, YoyRow};
use famreport_infra::ClearedCounts;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /api/sync-patient-families`. Which fields matter depends on
/// `action`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncActionRequest {
    pub action: String,
    pub reset: bool,
    pub offset: Option<u64>,
    pub batch_size: Option<u64>,
    pub fiscal_year_start: Option<String>,
    pub fiscal_year_end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactNotesRequest {
    pub action: String,
    pub fiscal_year_start: Option<String>,
    pub fiscal_year_end: Option<String>,
    pub selected_staff: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct FamiliesQuery {
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_limit() -> u64 {
    100
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub success: bool,
    #[serde(flatten)]
    pub metrics: DashboardMetrics,
}

/// Progress record in the shape the dashboard client reads.
#[derive(Debug, Serialize)]
pub struct SyncStateBody {
    pub last_synced_contact_count: u64,
    pub total_known: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStateResponse {
    pub success: bool,
    pub sync_state: SyncStateBody,
    pub total_contacts: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchResponse {
    pub success: bool,
    pub cached_count: u64,
    pub next_skip: u64,
    pub total_contacts: u64,
    pub complete: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResetResponse {
    pub success: bool,
    pub next_skip: u64,
    pub cached_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshDatesResponse {
    pub success: bool,
    pub next_offset: u64,
    pub total_cached: u64,
    pub complete: bool,
}

#[derive(Debug, Serialize)]
pub struct YoyResponse {
    pub success: bool,
    pub data: Vec<YoyRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportCallsResponse {
    pub success: bool,
    pub total_calls: u64,
    pub calls_by_staff: std::collections::BTreeMap<String, u64>,
    pub staff_list: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FamiliesResponse {
    pub families: Vec<Contact>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
    pub deleted: ClearedCounts,
}

// -------------------------
// Mapping helpers
// -------------------------

/// A request bound: a plain calendar date or an instant with the offset the
/// client sent.
#[derive(Debug, Clone, Copy)]
enum Bound {
    Date(NaiveDate),
    Instant(DateTime<FixedOffset>),
}

impl Bound {
    fn parse(raw: &str) -> Option<Bound> {
        let raw = raw.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(Bound::Instant)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(Bound::Date))
    }

    /// Calendar date in the sender's offset.
    fn date(&self) -> NaiveDate {
        match self {
            Bound::Date(d) => *d,
            Bound::Instant(dt) => dt.date_naive(),
        }
    }

    /// Date used to pick a fiscal year from a lone bound. Instants are
    /// nudged half a day inward so a local midnight serialized in UTC lands
    /// on the intended day.
    fn anchor(&self, nudge: TimeDelta) -> NaiveDate {
        match self {
            Bound::Date(d) => *d,
            Bound::Instant(dt) => (*dt + nudge).date_naive(),
        }
    }
}

/// When both bounds are instants within a day of a fiscal year's edges, that
/// fiscal year. Clients send local midnights converted to UTC, which shifts
/// the calendar date by up to a day either way.
fn snap_to_fiscal_year(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Option<FiscalYear> {
    if end <= start {
        return None;
    }
    let midpoint = start + (end - start) / 2;
    let fy = fiscal_year_for(midpoint.date_naive()).ok()?;
    let near = |a: NaiveDate, b: NaiveDate| (a - b).num_days().abs() <= 1;
    (near(start.date_naive(), fy.start_date) && near(end.date_naive(), fy.end_date)).then_some(fy)
}

/// The reporting interval named by the request bounds.
///
/// With neither bound given, the fiscal year containing today is used.
pub fn interval_from(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<FiscalYear, axum::response::Response> {
    let bad = |field: &str, raw: &str| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_date",
            format!("{field} is not a date: {raw:?}"),
        )
    };
    let invalid = |e: famreport_core::DomainError| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
    };
    let half_day = TimeDelta::hours(12);

    match (start, end) {
        (None, None) => fiscal_year_for(Utc::now().date_naive()).map_err(invalid),
        (Some(s), None) => {
            let start = Bound::parse(s).ok_or_else(|| bad("fiscalYearStart", s))?;
            fiscal_year_for(start.anchor(half_day)).map_err(invalid)
        }
        (None, Some(e)) => {
            let end = Bound::parse(e).ok_or_else(|| bad("fiscalYearEnd", e))?;
            fiscal_year_for(end.anchor(-half_day)).map_err(invalid)
        }
        (Some(s), Some(e)) => {
            let start = Bound::parse(s).ok_or_else(|| bad("fiscalYearStart", s))?;
            let end = Bound::parse(e).ok_or_else(|| bad("fiscalYearEnd", e))?;
            if let (Bound::Instant(a), Bound::Instant(b)) = (start, end) {
                if let Some(fy) = snap_to_fiscal_year(a, b) {
                    return Ok(fy);
                }
            }
            FiscalYear::spanning(start.date(), end.date()).map_err(invalid)
        }
    }
}
