//! Process-wide logging setup shared by ledger binaries.

/// Initialize structured logging with the default format (JSON on stderr).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use crate::tracing::{LogFormat, init_with};
