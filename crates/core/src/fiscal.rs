//! Fiscal-year bucketing.
//!
//! The reporting year runs October 1 through September 30 and is labelled by
//! the calendar year in which it ends (`FY 2025` = Oct 1, 2024 – Sep 30, 2025).
//! Everything here is pure and works on calendar dates; instants coming off
//! the wire are compared by their UTC calendar date.

use core::hash::{Hash, Hasher};
use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Month in which every fiscal year starts.
pub const START_MONTH: u32 = 10;

/// An Oct 1 – Sep 30 reporting interval.
///
/// Equality and hashing consider only the `(start_date, end_date)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalYear {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl PartialEq for FiscalYear {
    fn eq(&self, other: &Self) -> bool {
        self.start_date == other.start_date && self.end_date == other.end_date
    }
}

impl Eq for FiscalYear {}

impl Hash for FiscalYear {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start_date.hash(state);
        self.end_date.hash(state);
    }
}

/// One calendar month inside a fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    /// Short month name, e.g. `Oct`.
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalYear {
    /// The fiscal year that starts on October 1 of `start_year`.
    pub fn starting(start_year: i32) -> DomainResult<Self> {
        let start_date = NaiveDate::from_ymd_opt(start_year, START_MONTH, 1)
            .ok_or_else(|| DomainError::validation(format!("year out of range: {start_year}")))?;
        let end_date = start_year
            .checked_add(1)
            .and_then(|end_year| NaiveDate::from_ymd_opt(end_year, 9, 30))
            .ok_or_else(|| DomainError::validation(format!("year out of range: {start_year}")))?;

        Ok(Self {
            label: format!("FY {}", start_year + 1),
            start_date,
            end_date,
        })
    }

    /// An arbitrary inclusive reporting interval. When it coincides with a
    /// fiscal year it carries that year's label.
    pub fn spanning(start_date: NaiveDate, end_date: NaiveDate) -> DomainResult<Self> {
        if start_date > end_date {
            return Err(DomainError::validation(format!(
                "interval starts after it ends: {start_date} > {end_date}"
            )));
        }

        let canonical = fiscal_year_for(start_date)?;
        if canonical.start_date == start_date && canonical.end_date == end_date {
            return Ok(canonical);
        }

        Ok(Self {
            label: format!(
                "{} - {}",
                start_date.format("%b %-d, %Y"),
                end_date.format("%b %-d, %Y")
            ),
            start_date,
            end_date,
        })
    }

    /// The fiscal year ending in calendar year `end_year` (`FY <end_year>`).
    pub fn ending(end_year: i32) -> DomainResult<Self> {
        let start_year = end_year
            .checked_sub(1)
            .ok_or_else(|| DomainError::validation(format!("year out of range: {end_year}")))?;
        Self::starting(start_year)
    }

    pub fn start_year(&self) -> i32 {
        self.start_date.year()
    }

    /// Machine-friendly form, e.g. `2024-2025`.
    pub fn value(&self) -> String {
        format!("{}-{}", self.start_date.year(), self.end_date.year())
    }

    /// Human-friendly range, e.g. `Oct 1, 2024 - Sep 30, 2025`.
    pub fn format_range(&self) -> String {
        format!(
            "{} - {}",
            self.start_date.format("%b %-d, %Y"),
            self.end_date.format("%b %-d, %Y")
        )
    }

    /// The fiscal year immediately before this one.
    pub fn previous(&self) -> DomainResult<Self> {
        Self::starting(self.start_year() - 1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        is_within(date, self)
    }
}

impl core::fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for FiscalYear {
    type Err = DomainError;

    /// Accepts `FY 2025`, `FY2025`, `2025` (all meaning the year ending in 2025)
    /// or the range form `2024-2025`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || DomainError::validation(format!("invalid fiscal year: {raw:?}"));

        if let Some((start, end)) = raw.split_once('-') {
            let start: i32 = start.trim().parse().map_err(|_| invalid())?;
            let end: i32 = end.trim().parse().map_err(|_| invalid())?;
            if end != start + 1 {
                return Err(invalid());
            }
            return Self::starting(start);
        }

        let digits = raw
            .strip_prefix("FY")
            .or_else(|| raw.strip_prefix("fy"))
            .unwrap_or(raw)
            .trim();
        let end_year: i32 = digits.parse().map_err(|_| invalid())?;
        Self::ending(end_year)
    }
}

/// The fiscal year containing `reference`.
///
/// October through December belong to the fiscal year starting that same
/// October; January through September to the one that started the previous
/// October.
pub fn fiscal_year_for(reference: NaiveDate) -> DomainResult<FiscalYear> {
    let start_year = if reference.month() >= START_MONTH {
        reference.year()
    } else {
        reference.year() - 1
    };
    FiscalYear::starting(start_year)
}

/// The fiscal year containing `reference` followed by the `n` before it
/// (most recent first, `n + 1` entries).
pub fn fiscal_years_back(reference: NaiveDate, n: usize) -> DomainResult<Vec<FiscalYear>> {
    let current = fiscal_year_for(reference)?;
    let mut years = Vec::with_capacity(n + 1);
    let mut year = current;
    for _ in 0..n {
        let prior = year.previous()?;
        years.push(year);
        year = prior;
    }
    years.push(year);
    Ok(years)
}

/// The twelve month buckets of `fy`, in calendar order from its start month.
///
/// Buckets are contiguous: each ends the day before the next starts and
/// together they cover the whole interval.
pub fn months_of(fy: &FiscalYear) -> Vec<MonthBucket> {
    let mut buckets: Vec<MonthBucket> = Vec::with_capacity(12);

    for day in fy.start_date.iter_days().take_while(|d| *d <= fy.end_date) {
        match buckets.last_mut() {
            Some(bucket) if bucket.start.month() == day.month() => bucket.end = day,
            _ => buckets.push(MonthBucket {
                label: day.format("%b").to_string(),
                start: day,
                end: day,
            }),
        }
    }

    buckets
}

/// Whether `date` falls inside `fy`, inclusive on both bounds.
pub fn is_within(date: NaiveDate, fy: &FiscalYear) -> bool {
    date >= fy.start_date && date <= fy.end_date
}
