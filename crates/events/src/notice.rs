//! Notification payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use famreport_core::WidgetId;

/// Sent by the widget store after every mutation of the widget list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetNotice {
    Added { id: WidgetId, count: usize },
    Removed { id: WidgetId, count: usize },
    Refreshed { count: usize },
}

impl WidgetNotice {
    /// Widget count after the mutation.
    pub fn count(&self) -> usize {
        match self {
            WidgetNotice::Added { count, .. }
            | WidgetNotice::Removed { count, .. }
            | WidgetNotice::Refreshed { count } => *count,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Batch,
    Reset,
    RefreshDates,
}

/// Progress report published by the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotice {
    pub step: SyncStep,
    pub next_offset: u64,
    pub total: u64,
    pub cached_count: u64,
    pub complete: bool,
    pub at: DateTime<Utc>,
}

impl SyncNotice {
    pub fn new(step: SyncStep, next_offset: u64, total: u64, cached_count: u64, complete: bool) -> Self {
        Self {
            step,
            next_offset,
            total,
            cached_count,
            complete,
            at: Utc::now(),
        }
    }

    /// Short SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self.step {
            SyncStep::Batch => "batch",
            SyncStep::Reset => "reset",
            SyncStep::RefreshDates => "refresh-dates",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_notice_is_tagged() {
        let n = WidgetNotice::Refreshed { count: 3 };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "refreshed");
        assert_eq!(n.count(), 3);
    }

    #[test]
    fn sync_notice_is_camel_case() {
        let n = SyncNotice::new(SyncStep::Batch, 50, 120, 50, false);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["nextOffset"], 50);
        assert_eq!(json["step"], "batch");
        assert_eq!(n.event_name(), "batch");
    }
}
