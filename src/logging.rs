//! Logging initialisation for macdock.
//!
//! When the `MACDOCK_LOG` environment variable is set to `1`, structured
//! logs are also written to `macdock.log` in the per-user log directory.
//! Otherwise only stderr output (filtered by `RUST_LOG`) is enabled.
//!
//! Returns a guard that must be kept alive for the duration of the process
//! so that buffered log lines are flushed on exit.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialise the global tracing subscriber.
///
/// `log_dir` is where the file layer writes when `MACDOCK_LOG=1`; when it is
/// `None` the system temp directory is used. `verbose` raises the default
/// stderr level from `warn` to `debug`.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> LogGuard {
    let default_level = if verbose { "debug" } else { "warn" };

    let file_guard = if std::env::var("MACDOCK_LOG").as_deref() == Ok("1") {
        let dir = log_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let _ = std::fs::create_dir_all(&dir);
        let file_appender = tracing_appender::rolling::never(dir, "macdock.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

        let default_level = if verbose { "debug" } else { "info" };
        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();

        None
    };

    LogGuard {
        _file_guard: file_guard,
    }
}
