//! Tracing/logging (shared setup).

/// Initialize process-wide tracing/logging from the log configuration.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(conf: &efn_core::LogConfig) {
    tracing::init(conf);
}

pub mod tracing;
