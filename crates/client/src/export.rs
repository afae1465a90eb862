//! CSV export of family lists to a directory.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use famreport_core::export::{
    MetricList, metric_families_filename, patient_families_filename, state_families_filename,
    write_metric_families, write_patient_families, write_state_families,
};
use famreport_core::geo::group_by_state;
use famreport_core::{Contact, FiscalYear};

use crate::api::{BackendClient, MetricsSource};
use crate::error::ClientError;

const PAGE_SIZE: u64 = 100;

fn create(dir: &Path, filename: &str) -> Result<(PathBuf, BufWriter<File>), ClientError> {
    std::fs::create_dir_all(dir).map_err(famreport_core::export::ExportError::from)?;
    let path = dir.join(filename);
    let file = File::create(&path).map_err(famreport_core::export::ExportError::from)?;
    Ok((path, BufWriter::new(file)))
}

/// Every cached family as `patient_families_<today>.csv`.
pub async fn export_patient_families(
    client: &BackendClient,
    dir: &Path,
    today: NaiveDate,
) -> Result<PathBuf, ClientError> {
    let families = client.all_patient_families(PAGE_SIZE).await?;
    let (path, sink) = create(dir, &patient_families_filename(today))?;
    write_patient_families(sink, &families)?;
    tracing::info!(path = %path.display(), rows = families.len(), "exported patient families");
    Ok(path)
}

/// One dashboard family list for `fy`.
pub async fn export_metric_families(
    source: &dyn MetricsSource,
    fy: &FiscalYear,
    list: MetricList,
    dir: &Path,
    today: NaiveDate,
) -> Result<PathBuf, ClientError> {
    let metrics = source.dashboard(fy).await?;
    let families = list.families(&metrics);
    let (path, sink) = create(dir, &metric_families_filename(list, today))?;
    write_metric_families(sink, list, families)?;
    tracing::info!(path = %path.display(), list = list.variant(), rows = families.len(), "exported metric families");
    Ok(path)
}

/// Families shown on the map for `fy`: created within it, or with no
/// creation date at all.
pub fn families_in_year(families: &[Contact], fy: &FiscalYear) -> Vec<Contact> {
    families
        .iter()
        .filter(|f| f.created_date.is_none() || f.created_within(fy))
        .cloned()
        .collect()
}

/// Per-state family counts for `fy`.
pub async fn state_summary(
    client: &BackendClient,
    fy: &FiscalYear,
) -> Result<BTreeMap<&'static str, Vec<Contact>>, ClientError> {
    let families = client.all_patient_families(PAGE_SIZE).await?;
    Ok(group_by_state(&families_in_year(&families, fy)))
}

/// Families in `state` (two-letter code) for `fy`.
pub async fn export_state_families(
    client: &BackendClient,
    fy: &FiscalYear,
    state: &str,
    dir: &Path,
) -> Result<PathBuf, ClientError> {
    let code = state.trim().to_ascii_uppercase();
    let groups = state_summary(client, fy).await?;
    let families = groups.get(code.as_str()).map(Vec::as_slice).unwrap_or_default();

    let (path, sink) = create(dir, &state_families_filename(&code, fy))?;
    write_state_families(sink, families)?;
    tracing::info!(path = %path.display(), state = %code, rows = families.len(), "exported state families");
    Ok(path)
}
