//! `famreport-client`: talks to the reporting backend, drives the sync loops,
//! keeps custom widgets and local preferences, and exports CSV files.

pub mod api;
pub mod driver;
pub mod error;
pub mod export;
pub mod housekeeping;
pub mod prefs;
pub mod widgets;

pub use api::{BackendClient, MetricsSource};
pub use driver::{CancelFlag, DriverConfig, DriverOutcome};
pub use error::ClientError;
pub use prefs::{LocalStore, StorageError};
pub use widgets::WidgetStore;
