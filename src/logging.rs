use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize tracing.
///
/// - Stdout: compact human-readable output, or JSON when `config.json` is set
/// - File: daily-rolling log under `config.directory` when configured
/// - Default level from `config.filter`, override via RUST_LOG env
///
/// Returns the file writer guard; keep it alive for the life of the process
/// or buffered lines are lost. Calling twice is harmless: the second call
/// leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ideaforge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (compact_layer, json_layer) = if config.json {
        (None, Some(fmt::layer().json().with_current_span(false)))
    } else {
        (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            ),
            None,
        )
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(compact_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Tracing initialized");
    }
    guard
}
