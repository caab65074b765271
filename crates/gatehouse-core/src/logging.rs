//! Tracing setup for the binary.
//!
//! Filter comes from `GATEHOUSE_LOG` (default `warn`). Logs go to stderr and,
//! when the logs directory is writable, to `<GATEHOUSE_HOME>/logs/gatehouse.log`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "GATEHOUSE_LOG";
/// Log file name inside the logs directory.
pub const LOG_FILE: &str = "gatehouse.log";

const DEFAULT_FILTER: &str = "warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber.
///
/// Returns the file writer guard; keep it alive until exit so buffered lines
/// are flushed. Calling this twice is harmless (the second call is ignored).
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match std::fs::create_dir_all(logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(logs_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(err) => {
            eprintln!(
                "Warning: cannot create log directory {}: {err}",
                logs_dir.display()
            );
            (None, None)
        }
    };

    let result = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if result.is_err() {
        return None;
    }
    guard
}
