//! Logging bootstrap
//!
//! - Colored compact console output
//! - Optional daily-rotating file output
//! - `RUST_LOG` wins over the configured default filter
//! - One span per administrative operation so pool, drain and naming lines
//!   can be correlated

use anyhow::{Context, Result};
use poolmux_core::{LoggingConfig, PoolIdentity};
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

const CRATE_DIRECTIVES: &[&str] = &["poolmux_core", "poolmux_runtime", "poolmuxd"];

/// Build the filter: `RUST_LOG` if set, otherwise the configured default
/// with our own crates at debug.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(&config.default_filter)
        .with_context(|| format!("invalid log filter '{}'", config.default_filter))?;
    if config.default_filter == "info" {
        for krate in CRATE_DIRECTIVES {
            filter = filter.add_directive(format!("{}=debug", krate).parse()?);
        }
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is configured; keep it
/// alive for the lifetime of the process or buffered lines are lost.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(config)?;

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .build(dir)
                .context("create log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}

/// Span for one administrative operation on a pool.
pub fn admin_span(operation: &'static str, identity: &PoolIdentity) -> Span {
    tracing::info_span!(
        "pool_admin",
        op = operation,
        pool = %identity,
        trace_id = %short_id()
    )
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
