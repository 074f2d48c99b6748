//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use efn_core::LogConfig;

/// Initialize tracing/logging for the process.
///
/// The level comes from `LOG_LEVEL` unless `RUST_LOG` is set (the env filter
/// wins). `LOG_FORMAT=production` selects JSON output; anything else is
/// plain text for local development.
pub fn init(conf: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(conf.level.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = if conf.format == "production" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
