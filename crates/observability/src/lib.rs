//! Shared tracing setup.

/// Subscriber configuration (format, filter, writer).
pub mod tracing;

pub use crate::tracing::{LOG_FORMAT_ENV, LogFormat};

/// Initialize process-wide logging using `FAMREPORT_LOG_FORMAT` (JSON when
/// unset).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env(LogFormat::Json));
}

/// Like [`init`] but with the format picked by the caller when the
/// environment does not say.
pub fn init_with_default(default: LogFormat) {
    tracing::init(LogFormat::from_env(default));
}
