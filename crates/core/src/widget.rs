//! Custom KPI widgets.

use serde::{Deserialize, Serialize};

use crate::fiscal::FiscalYear;
use crate::id::WidgetId;
use crate::metrics::DashboardMetrics;
use crate::taxonomy::EngagementKind;

/// A user-defined tile tracking one engagement kind for a fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomWidget {
    pub id: WidgetId,
    pub title: String,
    pub engagement_type: EngagementKind,
    pub value: u64,
    pub subtitle: String,
}

impl CustomWidget {
    /// Build a widget from freshly queried metrics. A blank title falls back
    /// to the kind's label.
    pub fn create(
        kind: EngagementKind,
        title: Option<&str>,
        fy: &FiscalYear,
        metrics: &DashboardMetrics,
    ) -> Self {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(kind.label())
            .to_string();

        Self {
            id: WidgetId::new(),
            title,
            engagement_type: kind,
            value: metrics.value_for(kind),
            subtitle: fy.label.clone(),
        }
    }

    /// Recompute value and subtitle for another fiscal year's metrics.
    pub fn refreshed(&self, fy: &FiscalYear, metrics: &DashboardMetrics) -> Self {
        Self {
            value: metrics.value_for(self.engagement_type),
            subtitle: fy.label.clone(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with(label: &str, n: u64) -> DashboardMetrics {
        let mut m = DashboardMetrics::default();
        m.engagement_types.insert(label.to_string(), n);
        m
    }

    #[test]
    fn defaults_title_to_kind_label() {
        let fy = FiscalYear::starting(2024).unwrap();
        let w = CustomWidget::create(
            EngagementKind::Lodging,
            Some("  "),
            &fy,
            &metrics_with("Lodging", 5),
        );
        assert_eq!(w.title, "Lodging Assistance");
        assert_eq!(w.value, 5);
        assert_eq!(w.subtitle, "FY 2025");
    }

    #[test]
    fn refresh_keeps_identity() {
        let fy = FiscalYear::starting(2024).unwrap();
        let w = CustomWidget::create(
            EngagementKind::Webinars,
            Some("Webinar reach"),
            &fy,
            &metrics_with("Webinar", 1),
        );
        let prior = fy.previous().unwrap();
        let r = w.refreshed(&prior, &metrics_with("Webinars", 8));
        assert_eq!(r.id, w.id);
        assert_eq!(r.title, "Webinar reach");
        assert_eq!(r.value, 8);
        assert_eq!(r.subtitle, "FY 2024");
    }

    #[test]
    fn serializes_kind_as_key() {
        let fy = FiscalYear::starting(2024).unwrap();
        let w = CustomWidget::create(
            EngagementKind::RideForKids,
            None,
            &fy,
            &DashboardMetrics::default(),
        );
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["engagementType"], "ride_for_kids");
        let back: CustomWidget = serde_json::from_value(json).unwrap();
        assert_eq!(back, w);
    }
}
