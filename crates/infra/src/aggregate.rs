//! Dashboard metrics computed from the local cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;

use famreport_core::fiscal::{fiscal_years_back, is_within, months_of};
use famreport_core::{
    Contact, ContactId, ContactNote, DashboardMetrics, Engagement, FamilySummary, FiscalYear, MonthlyRow,
    SupportCallSummary, SupportCategory, SupportTypes, YoyRow,
};

use crate::sync::SyncError;

/// Years shown before the current one in the year-over-year table.
pub const YOY_PRIOR_YEARS: usize = 3;

const UNASSIGNED_STAFF: &str = "Unassigned";

/// Read-side queries over the cache.
pub struct CacheAggregator {
    cache: Arc<dyn crate::cache::ContactCache>,
}

impl CacheAggregator {
    pub fn new(cache: Arc<dyn crate::cache::ContactCache>) -> Self {
        Self { cache }
    }

    pub async fn dashboard(&self, fy: &FiscalYear) -> Result<DashboardMetrics, SyncError> {
        let contacts = self.cache.all_contacts().await?;
        let engagements = self.cache.all_engagements().await?;
        Ok(compute_dashboard(&contacts, &engagements, fy))
    }

    /// One row per fiscal year, the `YOY_PRIOR_YEARS` before the year
    /// containing `reference` and that year itself, oldest first.
    pub async fn yoy_comparison(&self, reference: NaiveDate) -> Result<Vec<YoyRow>, SyncError> {
        let contacts = self.cache.all_contacts().await?;
        let engagements = self.cache.all_engagements().await?;

        let mut years = fiscal_years_back(reference, YOY_PRIOR_YEARS)?;
        years.reverse();

        Ok(years
            .iter()
            .map(|fy| {
                let m = compute_dashboard(&contacts, &engagements, fy);
                YoyRow {
                    fiscal_year: fy.label.clone(),
                    engaged: m.engaged_count,
                    newly_diagnosed: m.newly_diagnosed_count,
                    new_families: m.new_families_count,
                    first_time_engaged: m.first_time_engaged_count,
                    re_engaged: m.re_engaged_count,
                    total_engagements: m.total_interactions,
                }
            })
            .collect())
    }

    pub async fn support_calls(
        &self,
        fy: &FiscalYear,
        staff: &[String],
    ) -> Result<SupportCallSummary, SyncError> {
        let notes = self.cache.all_notes().await?;
        Ok(summarize_support_calls(&notes, fy, staff))
    }
}

/// Per-family view of the engagement history relative to one interval.
struct History {
    in_interval: Vec<NaiveDate>,
    before_start: bool,
}

/// Compute every dashboard figure for `fy`.
///
/// A family counts as engaged when it has an engagement row inside the
/// interval, or, when no rows were cached for it, when its last engagement
/// date falls inside it.
pub fn compute_dashboard(contacts: &[Contact], engagements: &[Engagement], fy: &FiscalYear) -> DashboardMetrics {
    let mut history: HashMap<ContactId, History> = HashMap::new();
    let mut engagement_types: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_interactions = 0u64;

    let months = months_of(fy);
    let mut monthly: Vec<MonthlyRow> = months
        .iter()
        .map(|m| MonthlyRow {
            month: m.label.clone(),
            ..MonthlyRow::default()
        })
        .collect();
    let month_index = |date: NaiveDate| months.iter().position(|m| date >= m.start && date <= m.end);

    for e in engagements {
        let h = history.entry(e.contact_id).or_insert(History {
            in_interval: Vec::new(),
            before_start: false,
        });
        if e.date < fy.start_date {
            h.before_start = true;
        } else if is_within(e.date, fy) {
            h.in_interval.push(e.date);
            total_interactions += 1;
            *engagement_types.entry(e.engagement_type.clone()).or_default() += 1;
            if let Some(i) = month_index(e.date) {
                monthly[i].count_engagement(SupportCategory::classify(&e.engagement_type));
            }
        }
    }

    let mut m = DashboardMetrics {
        total_families: contacts.len() as u64,
        analyzed_families: contacts.len() as u64,
        ..DashboardMetrics::default()
    };

    for c in contacts {
        if c.created_within(fy) {
            m.total_in_fiscal_year += 1;
        }

        if c.diagnosed_within(fy) {
            m.newly_diagnosed_families.push(c.summary(None));
            if let Some(i) = c.diagnosis_date.and_then(month_index) {
                monthly[i].newly_diagnosed += 1;
            }
        }

        let engagement_date = match history.get(&c.id) {
            Some(h) => h.in_interval.iter().max().copied(),
            None => c.last_engagement_date.filter(|d| is_within(*d, fy)),
        };
        let Some(engagement_date) = engagement_date else {
            continue;
        };

        let summary: FamilySummary = c.summary(Some(engagement_date));
        let has_earlier = history.get(&c.id).is_some_and(|h| h.before_start);
        if has_earlier {
            m.re_engaged_families.push(summary.clone());
        } else {
            m.first_time_engaged_families.push(summary.clone());
        }
        if c.created_within(fy) {
            m.new_families.push(summary.clone());
            if let Some(i) = c.created_date.and_then(month_index) {
                monthly[i].new_families += 1;
            }
        }
        m.engaged_families.push(summary);
    }

    for list in [
        &mut m.engaged_families,
        &mut m.newly_diagnosed_families,
        &mut m.new_families,
        &mut m.first_time_engaged_families,
        &mut m.re_engaged_families,
    ] {
        list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }

    m.engaged_count = m.engaged_families.len() as u64;
    m.not_engaged_count = m.total_families.saturating_sub(m.engaged_count);
    m.families_reached = m.engaged_count;
    m.newly_diagnosed_count = m.newly_diagnosed_families.len() as u64;
    m.new_families_count = m.new_families.len() as u64;
    m.first_time_engaged_count = m.first_time_engaged_families.len() as u64;
    m.re_engaged_count = m.re_engaged_families.len() as u64;
    m.support_types = SupportTypes::from_engagement_types(&engagement_types);
    m.engagement_types = engagement_types;
    m.total_interactions = total_interactions;
    m.monthly_data = monthly;
    m
}

/// Count support-call notes in `fy` by staff member.
///
/// `staff_list` always lists everyone with a call in the interval. A
/// non-empty `staff` selection narrows the counts to those members; blank
/// entries and `"all"` are ignored.
pub fn summarize_support_calls(notes: &[ContactNote], fy: &FiscalYear, staff: &[String]) -> SupportCallSummary {
    let selected: BTreeSet<&str> = staff
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .collect();
    let mut staff_list = BTreeSet::new();
    let mut summary = SupportCallSummary::default();

    for note in notes.iter().filter(|n| n.is_support_call() && is_within(n.date, fy)) {
        let who = note
            .staff
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNASSIGNED_STAFF);
        staff_list.insert(who.to_string());

        if !selected.is_empty() && !selected.contains(who) {
            continue;
        }
        summary.total_calls += 1;
        *summary.calls_by_staff.entry(who.to_string()).or_default() += 1;
    }

    summary.staff_list = staff_list.into_iter().collect();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ContactCache, Enrichment, InMemoryContactCache};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn fy2025() -> FiscalYear {
        FiscalYear::starting(2024).unwrap()
    }

    fn family(id: i64, name: &str, created: Option<NaiveDate>) -> Contact {
        let mut c = Contact::new(ContactId::new(id), name);
        c.created_date = created;
        c
    }

    fn engagement(id: i64, date: NaiveDate, label: &str) -> Engagement {
        Engagement {
            contact_id: ContactId::new(id),
            date,
            engagement_type: label.into(),
        }
    }

    fn fixture() -> (Vec<Contact>, Vec<Engagement>) {
        let mut diagnosed = family(4, "Diaz", Some(d(2020, 5, 1)));
        diagnosed.diagnosis_date = Some(d(2025, 1, 20));

        let contacts = vec![
            family(1, "Abbott", Some(d(2024, 11, 2))),
            family(2, "Brooks", Some(d(2019, 3, 3))),
            family(3, "Chen", Some(d(2024, 10, 5))),
            diagnosed,
        ];
        let engagements = vec![
            engagement(1, d(2024, 11, 10), "Butterfly Fund"),
            engagement(1, d(2025, 2, 1), "Webinar"),
            engagement(2, d(2023, 6, 1), "Uber Program"),
            engagement(2, d(2024, 10, 1), "Uber Program"),
            engagement(3, d(2025, 10, 1), "Webinar"),
        ];
        (contacts, engagements)
    }

    #[test]
    fn counts_engaged_and_cohorts() {
        let (contacts, engagements) = fixture();
        let m = compute_dashboard(&contacts, &engagements, &fy2025());

        assert_eq!(m.total_families, 4);
        assert_eq!(m.total_in_fiscal_year, 2);
        assert_eq!(m.engaged_count, 2);
        assert_eq!(m.not_engaged_count, 2);
        assert_eq!(m.families_reached, 2);
        assert_eq!(m.first_time_engaged_count, 1);
        assert_eq!(m.re_engaged_count, 1);
        assert_eq!(m.new_families_count, 1);
        assert_eq!(m.newly_diagnosed_count, 1);
        assert_eq!(m.total_interactions, 3);

        assert_eq!(m.engaged_families[0].name, "Abbott");
        assert_eq!(m.engaged_families[0].engagement_date, Some(d(2025, 2, 1)));
        assert_eq!(m.re_engaged_families[0].name, "Brooks");
    }

    #[test]
    fn breakdowns_and_months() {
        let (contacts, engagements) = fixture();
        let m = compute_dashboard(&contacts, &engagements, &fy2025());

        assert_eq!(m.engagement_types.get("Uber Program"), Some(&1));
        assert_eq!(m.support_types.butterfly_fund, 1);
        assert_eq!(m.support_types.uber_program, 1);
        assert_eq!(m.support_types.webinars, 1);

        assert_eq!(m.monthly_data.len(), 12);
        let oct = &m.monthly_data[0];
        assert_eq!(oct.month, "Oct");
        assert_eq!(oct.uber_program, 1);
        assert_eq!(oct.total_engagements, 1);
        let nov = &m.monthly_data[1];
        assert_eq!(nov.butterfly_fund, 1);
        assert_eq!(nov.new_families, 1);
        assert_eq!(m.monthly_data[3].newly_diagnosed, 1);
    }

    #[test]
    fn last_engagement_date_counts_without_rows() {
        let mut c = family(9, "Ellis", None);
        c.last_engagement_date = Some(d(2025, 9, 30));
        let m = compute_dashboard(&[c], &[], &fy2025());
        assert_eq!(m.engaged_count, 1);
        assert_eq!(m.first_time_engaged_count, 1);
    }

    #[test]
    fn support_calls_respect_staff_filter() {
        let note = |id, date, kind: &str, staff: Option<&str>| ContactNote {
            contact_id: ContactId::new(id),
            date,
            note_type: kind.into(),
            staff: staff.map(String::from),
        };
        let notes = vec![
            note(1, d(2024, 12, 1), "Support Call", Some("Dana")),
            note(2, d(2025, 1, 1), "Phone call", Some("Lee")),
            note(3, d(2025, 1, 2), "Phone Call", None),
            note(4, d(2025, 1, 3), "Email", Some("Dana")),
            note(5, d(2023, 1, 3), "Support Call", Some("Dana")),
        ];

        let all = summarize_support_calls(&notes, &fy2025(), &[]);
        assert_eq!(all.total_calls, 3);
        assert_eq!(all.staff_list, vec!["Dana", "Lee", "Unassigned"]);

        let dana = summarize_support_calls(&notes, &fy2025(), &["Dana".to_string()]);
        assert_eq!(dana.total_calls, 1);
        assert_eq!(dana.calls_by_staff.get("Dana"), Some(&1));
        assert_eq!(dana.staff_list.len(), 3);

        let pair = summarize_support_calls(&notes, &fy2025(), &["Dana".to_string(), " Lee ".to_string()]);
        assert_eq!(pair.total_calls, 2);
        assert_eq!(pair.calls_by_staff.get("Unassigned"), None);

        let everyone = summarize_support_calls(&notes, &fy2025(), &["all".to_string(), String::new()]);
        assert_eq!(everyone.total_calls, 3);
    }

    #[tokio::test]
    async fn yoy_rows_run_oldest_first() {
        let cache = Arc::new(InMemoryContactCache::new());
        let (contacts, engagements) = fixture();
        cache.upsert_contacts(&contacts).await.unwrap();
        for id in 1..=3 {
            let rows: Vec<_> = engagements
                .iter()
                .filter(|e| e.contact_id == ContactId::new(id))
                .cloned()
                .collect();
            cache
                .record_enrichment(ContactId::new(id), &Enrichment::new(rows, vec![], None))
                .await
                .unwrap();
        }

        let agg = CacheAggregator::new(cache);
        let rows = agg.yoy_comparison(d(2025, 3, 1)).await.unwrap();
        let labels: Vec<_> = rows.iter().map(|r| r.fiscal_year.as_str()).collect();
        assert_eq!(labels, vec!["FY 2022", "FY 2023", "FY 2024", "FY 2025"]);
        assert_eq!(rows[3].engaged, 2);
        assert_eq!(rows[2].engaged, 0);
        assert_eq!(rows[1].engaged, 1);
    }
}
