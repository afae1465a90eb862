//! Custom KPI widgets persisted in local storage.
//!
//! [`WidgetStore`] is the single owner of the widget list. Every mutation is
//! persisted under [`WIDGETS_KEY`] and announced to subscribers as a
//! [`WidgetNotice`].

use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;

use famreport_core::{CustomWidget, EngagementKind, FiscalYear, WidgetId};
use famreport_events::{EventBus, InMemoryEventBus, Subscription, WidgetNotice};

use crate::api::MetricsSource;
use crate::error::ClientError;
use crate::prefs::{LocalStore, StorageError};

pub const WIDGETS_KEY: &str = "customWidgets";

pub struct WidgetStore {
    storage: Arc<LocalStore>,
    widgets: Mutex<Vec<CustomWidget>>,
    bus: InMemoryEventBus<WidgetNotice>,
}

impl WidgetStore {
    /// Load the persisted list; a corrupt value is logged and read as empty.
    pub fn open(storage: Arc<LocalStore>) -> Self {
        let widgets = storage.get_json::<Vec<CustomWidget>>(WIDGETS_KEY).unwrap_or_default();
        tracing::debug!(count = widgets.len(), "loaded custom widgets");
        Self {
            storage,
            widgets: Mutex::new(widgets),
            bus: InMemoryEventBus::new(),
        }
    }

    pub fn list(&self) -> Vec<CustomWidget> {
        self.widgets.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Receives one notice per mutation from now on.
    pub fn subscribe(&self) -> Subscription<WidgetNotice> {
        self.bus.subscribe()
    }

    /// Query `source` for `fy` and store a widget tracking `kind`.
    pub async fn add(
        &self,
        kind: EngagementKind,
        title: Option<&str>,
        fy: &FiscalYear,
        source: &dyn MetricsSource,
    ) -> Result<CustomWidget, ClientError> {
        let metrics = source.dashboard(fy).await?;
        let widget = CustomWidget::create(kind, title, fy, &metrics);

        let count = self.update(|widgets| {
            widgets.push(widget.clone());
            Ok(())
        })?;
        tracing::info!(id = %widget.id, kind = %kind, value = widget.value, "custom widget added");
        self.notify(WidgetNotice::Added { id: widget.id, count });
        Ok(widget)
    }

    /// Remove the widget with `id`. Unknown ids are a silent no-op; returns
    /// whether anything was removed.
    pub fn remove(&self, id: WidgetId) -> Result<bool, ClientError> {
        let mut removed = false;
        let count = self.update(|widgets| {
            let before = widgets.len();
            widgets.retain(|w| w.id != id);
            removed = widgets.len() != before;
            Ok(())
        })?;

        if removed {
            self.notify(WidgetNotice::Removed { id, count });
        }
        Ok(removed)
    }

    /// Re-query every widget's value for `fy`, one request per widget,
    /// concurrently. Widgets whose query fails keep their old value.
    pub async fn refresh(&self, fy: &FiscalYear, source: Arc<dyn MetricsSource>) -> Result<Vec<CustomWidget>, ClientError> {
        let current = self.list();

        let mut set = JoinSet::new();
        for (i, widget) in current.iter().cloned().enumerate() {
            let source = source.clone();
            let fy = fy.clone();
            set.spawn(async move {
                let result = source.dashboard(&fy).await.map(|m| widget.refreshed(&fy, &m));
                (i, widget.id, result)
            });
        }

        let mut refreshed = current;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, _, Ok(widget))) => refreshed[i] = widget,
                Ok((_, id, Err(e))) => tracing::warn!(widget = %id, error = %e, "widget refresh failed"),
                Err(e) => tracing::error!(error = %e, "widget refresh task failed"),
            }
        }

        let count = self.update(|widgets| {
            // Widgets removed while the queries ran stay removed.
            for w in widgets.iter_mut() {
                if let Some(fresh) = refreshed.iter().find(|r| r.id == w.id) {
                    *w = fresh.clone();
                }
            }
            Ok(())
        })?;
        self.notify(WidgetNotice::Refreshed { count });
        Ok(self.list())
    }

    fn update(
        &self,
        f: impl FnOnce(&mut Vec<CustomWidget>) -> Result<(), ClientError>,
    ) -> Result<usize, ClientError> {
        let mut widgets = self.widgets.lock().map_err(|_| StorageError::Poisoned)?;
        f(&mut widgets)?;

        if widgets.is_empty() {
            self.storage.remove(WIDGETS_KEY)?;
        } else {
            self.storage.set_json(WIDGETS_KEY, &*widgets)?;
        }
        Ok(widgets.len())
    }

    fn notify(&self, notice: WidgetNotice) {
        if let Err(e) = self.bus.publish(notice) {
            tracing::warn!(error = ?e, "failed to publish widget notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use famreport_core::DashboardMetrics;

    use super::*;

    struct Fixed(DashboardMetrics);

    #[async_trait::async_trait]
    impl MetricsSource for Fixed {
        async fn dashboard(&self, _fy: &FiscalYear) -> Result<DashboardMetrics, ClientError> {
            Ok(self.0.clone())
        }
    }

    fn metrics(entries: &[(&str, u64)]) -> DashboardMetrics {
        let mut m = DashboardMetrics::default();
        for (label, n) in entries {
            m.engagement_types.insert(label.to_string(), *n);
        }
        m
    }

    fn store(dir: &tempfile::TempDir) -> (WidgetStore, Arc<LocalStore>) {
        let storage = Arc::new(LocalStore::open(dir.path().join("local_storage.json")));
        (WidgetStore::open(storage.clone()), storage)
    }

    #[tokio::test]
    async fn add_then_remove_restores_storage() {
        let dir = tempfile::tempdir().unwrap();
        let (widgets, storage) = store(&dir);
        let fy = FiscalYear::starting(2024).unwrap();
        let source = Fixed(metrics(&[("Lodging Assistance", 4)]));

        let w = widgets.add(EngagementKind::Lodging, None, &fy, &source).await.unwrap();
        assert_eq!(w.title, "Lodging");
        assert_eq!(w.value, 4);
        assert_eq!(w.subtitle, "FY 2025");
        assert!(storage.get(WIDGETS_KEY).is_some());

        assert!(widgets.remove(w.id).unwrap());
        assert!(storage.get(WIDGETS_KEY).is_none());
        assert!(!widgets.remove(w.id).unwrap());
    }

    #[tokio::test]
    async fn every_mutation_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let (widgets, _) = store(&dir);
        let a = widgets.subscribe();
        let b = widgets.subscribe();
        let fy = FiscalYear::starting(2024).unwrap();
        let source = Fixed(metrics(&[]));

        for _ in 0..3 {
            widgets.add(EngagementKind::Webinars, Some("Webinars"), &fy, &source).await.unwrap();
        }
        assert_eq!(widgets.list().len(), 3);

        let notices = a.drain();
        assert_eq!(notices.len(), 3);
        assert_eq!(notices.last().map(WidgetNotice::count), Some(3));
        assert_eq!(b.drain().len(), 3);

        // Unknown id: no notice.
        widgets.remove(WidgetId::new()).unwrap();
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn refresh_recomputes_values_for_new_year() {
        let dir = tempfile::tempdir().unwrap();
        let (widgets, storage) = store(&dir);
        let fy24 = FiscalYear::starting(2023).unwrap();
        let fy25 = FiscalYear::starting(2024).unwrap();

        widgets
            .add(EngagementKind::ButterflyFund, None, &fy24, &Fixed(metrics(&[("Butterfly Fund", 1)])))
            .await
            .unwrap();
        let sub = widgets.subscribe();

        let source: Arc<dyn MetricsSource> = Arc::new(Fixed(metrics(&[("Butterfly Fund", 7)])));
        let refreshed = widgets.refresh(&fy25, source).await.unwrap();
        assert_eq!(refreshed[0].value, 7);
        assert_eq!(refreshed[0].subtitle, "FY 2025");
        assert_eq!(sub.drain(), vec![WidgetNotice::Refreshed { count: 1 }]);

        let reopened = WidgetStore::open(storage);
        assert_eq!(reopened.list()[0].value, 7);
    }

    #[tokio::test]
    async fn corrupt_list_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStore::open(dir.path().join("local_storage.json")));
        storage.set(WIDGETS_KEY, "{broken").unwrap();

        let widgets = WidgetStore::open(storage);
        assert!(widgets.list().is_empty());
    }
}
