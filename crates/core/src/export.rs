//! CSV file formats for family lists.
//!
//! Header row first, comma separated; text fields are always quoted with
//! embedded quotes doubled, numeric ids are left bare.

use std::io::Write;

use chrono::NaiveDate;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

use crate::contact::{Contact, FamilySummary};
use crate::fiscal::FiscalYear;
use crate::id::ContactId;
use crate::metrics::DashboardMetrics;

pub const CRM_CONTACT_URL: &str = "https://app.virtuoussoftware.com/Generosity/Contact/View";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// The five metric family lists on the dashboard.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MetricList {
    Engaged,
    NewlyDiagnosed,
    NewFamilies,
    FirstTimeEngaged,
    ReEngaged,
}

impl MetricList {
    pub const ALL: [MetricList; 5] = [
        MetricList::Engaged,
        MetricList::NewlyDiagnosed,
        MetricList::NewFamilies,
        MetricList::FirstTimeEngaged,
        MetricList::ReEngaged,
    ];

    pub fn variant(&self) -> &'static str {
        match self {
            MetricList::Engaged => "engaged",
            MetricList::NewlyDiagnosed => "newlyDiagnosed",
            MetricList::NewFamilies => "newFamilies",
            MetricList::FirstTimeEngaged => "firstTimeEngaged",
            MetricList::ReEngaged => "reEngaged",
        }
    }

    /// Every list but the diagnosis one carries an engagement date column.
    pub fn shows_engagement_date(&self) -> bool {
        !matches!(self, MetricList::NewlyDiagnosed)
    }

    pub fn families<'a>(&self, metrics: &'a DashboardMetrics) -> &'a [FamilySummary] {
        match self {
            MetricList::Engaged => &metrics.engaged_families,
            MetricList::NewlyDiagnosed => &metrics.newly_diagnosed_families,
            MetricList::NewFamilies => &metrics.new_families,
            MetricList::FirstTimeEngaged => &metrics.first_time_engaged_families,
            MetricList::ReEngaged => &metrics.re_engaged_families,
        }
    }
}

impl core::str::FromStr for MetricList {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().replace(['-', '_'], "").to_lowercase();
        MetricList::ALL
            .into_iter()
            .find(|m| m.variant().to_lowercase() == needle)
            .ok_or_else(|| crate::error::DomainError::validation(format!("unknown list: {s:?}")))
    }
}

pub fn contact_link(id: ContactId) -> String {
    format!("{CRM_CONTACT_URL}/{id}")
}

/// `<dataset>_<qualifier>.csv` with spaces replaced by underscores.
pub fn export_filename(dataset: &str, qualifier: &str) -> String {
    format!("{dataset}_{qualifier}.csv").replace(' ', "_")
}

pub fn patient_families_filename(today: NaiveDate) -> String {
    export_filename("patient_families", &today.to_string())
}

pub fn metric_families_filename(list: MetricList, today: NaiveDate) -> String {
    export_filename(&format!("{}_families", list.variant()), &today.to_string())
}

pub fn state_families_filename(state: &str, fy: &FiscalYear) -> String {
    export_filename(&format!("patient_families_{state}"), &fy.label)
}

/// Fields are written verbatim; every text field goes through [`quoted`]
/// first, so only the numeric ID is left bare.
fn writer<W: Write>(sink: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(sink)
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn header<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names.into_iter().map(quoted).collect()
}

fn text(value: Option<&str>) -> String {
    quoted(value.unwrap_or(""))
}

fn date(value: Option<NaiveDate>) -> String {
    quoted(&value.map(|d| d.to_string()).unwrap_or_default())
}

/// ID, Name, Created Date, Email, Phone, Address.
pub fn write_patient_families<W: Write>(sink: W, families: &[Contact]) -> Result<(), ExportError> {
    let mut w = writer(sink);
    w.write_record(header(["ID", "Name", "Created Date", "Email", "Phone", "Address"]))?;
    for f in families {
        w.write_record([
            f.id.to_string(),
            quoted(&f.name),
            date(f.created_date),
            text(f.email.as_deref()),
            text(f.phone.as_deref()),
            text(f.address.as_deref()),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// ID, Name, Email, Created Date and, for lists that have one, Engagement Date.
pub fn write_metric_families<W: Write>(
    sink: W,
    list: MetricList,
    families: &[FamilySummary],
) -> Result<(), ExportError> {
    let mut w = writer(sink);
    let mut columns = vec!["ID", "Name", "Email", "Created Date"];
    if list.shows_engagement_date() {
        columns.push("Engagement Date");
    }
    w.write_record(header(columns))?;

    for f in families {
        let mut row = vec![
            f.id.to_string(),
            quoted(&f.name),
            text(f.email.as_deref()),
            date(f.created_date),
        ];
        if list.shows_engagement_date() {
            row.push(date(f.engagement_date));
        }
        w.write_record(&row)?;
    }
    w.flush()?;
    Ok(())
}

/// ID, Name, Email, Phone, Address, Virtuous Link.
pub fn write_state_families<W: Write>(sink: W, families: &[Contact]) -> Result<(), ExportError> {
    let mut w = writer(sink);
    w.write_record(header(["ID", "Name", "Email", "Phone", "Address", "Virtuous Link"]))?;
    for f in families {
        w.write_record([
            f.id.to_string(),
            quoted(&f.name),
            text(f.email.as_deref()),
            text(f.phone.as_deref()),
            text(f.address.as_deref()),
            quoted(&contact_link(f.id)),
        ])?;
    }
    w.flush()?;
    Ok(())
}
