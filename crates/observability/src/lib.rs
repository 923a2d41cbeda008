//! Tracing/logging setup shared by the binaries and integration tests.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::LoggingSettings;

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(settings: &LoggingSettings) {
    crate::tracing::init(settings);
}
