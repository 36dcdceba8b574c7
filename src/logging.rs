//! Log sinks for the engine host.
//!
//! Every operation acquires and releases an advisory lock, so those events
//! go to [`LOCK_TARGET`] and stay off unless `trace_locks` is set.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target of per-operation advisory lock events
pub const LOCK_TARGET: &str = "economy::lock";

const QUIET_TARGETS: &str = "sqlx=warn";

fn rotation(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

fn filter_directives(config: &AppConfig) -> String {
    let mut directives = format!("{},{}", config.log_level, QUIET_TARGETS);
    if !config.trace_locks {
        directives.push_str(&format!(",{LOCK_TARGET}=off"));
    }
    directives
}

/// Install the global subscriber. `RUST_LOG` replaces the configured filter.
/// Keep the guard alive for the life of the process or buffered lines are lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let appender = RollingFileAppender::new(rotation(&config.rotation), &config.log_dir, &config.log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // actor/listing/key/reference stay queryable as JSON keys
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer().with_target(false).with_writer(non_blocking).with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
