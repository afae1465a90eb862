//! `famreport-core` reporting domain building blocks.
//!
//! This crate contains **pure domain** code (no IO besides `std::io::Write`
//! sinks for CSV export): records mirrored from the CRM, fiscal-year bucketing,
//! the engagement taxonomy, dashboard metric shapes, and file formats.

pub mod contact;
pub mod error;
pub mod export;
pub mod fiscal;
pub mod geo;
pub mod id;
pub mod metrics;
pub mod progress;
pub mod taxonomy;
pub mod widget;

pub use contact::{Contact, ContactNote, Engagement, FamilySummary};
pub use error::{DomainError, DomainResult};
pub use fiscal::{FiscalYear, MonthBucket};
pub use id::{ContactId, WidgetId};
pub use metrics::{DashboardMetrics, MonthlyRow, SupportCallSummary, SupportTypes, YoyRow};
pub use progress::{SyncProgress, SyncStateView};
pub use taxonomy::{EngagementKind, SupportCategory};
pub use widget::CustomWidget;
