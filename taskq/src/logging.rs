//! Tracing subscriber setup for the subscriber binary.

use crate::config::LoggingOptions;
use taskq_shared::{TaskqError, TaskqResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "taskq-subscriber.log";

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Install the global subscriber: stdout always, plus a daily rolling
/// file when `options.directory` is set.
///
/// The returned guard flushes the file writer on drop and must live as
/// long as the process logs.
pub fn init_logging(options: &LoggingOptions, verbose: bool) -> TaskqResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let (file_layer, guard) = match &options.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| TaskqError::Internal(format!("failed to install tracing subscriber: {}", e)))?;

    Ok(guard)
}
