//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Embedders that want them printed call
//! [`init`] once at startup. `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed, in which case the
/// existing one is kept.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ems_timeseries={}", config.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
