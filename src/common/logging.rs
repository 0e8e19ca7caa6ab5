//! Logging and tracing configuration
//!
//! The worker's stdout is the protocol channel, so worker-side logging goes
//! to stderr and to a log file, never to stdout.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::paths;

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is WARN so command output stays clean.
pub fn init_cli() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("objproxy=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Handle returned by [`init_worker`]; keep it alive for the worker's lifetime
/// so buffered file output is flushed on exit.
pub struct WorkerLogging {
    /// Log file path, when file logging could be set up
    pub log_file: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

/// Initialize tracing for a worker process (file + stderr logging)
///
/// The worker logs to:
/// 1. `worker.log` in the platform log directory (non-blocking writer)
/// 2. stderr, which the client either discards or inherits
///
/// Log level controlled by `RUST_LOG`, default is DEBUG to capture requests.
pub fn init_worker() -> WorkerLogging {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("objproxy=debug,info"));

    match paths::ensure_log_dir() {
        Ok(Some(log_dir)) => {
            let appender = tracing_appender::rolling::never(&log_dir, "worker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(worker_stderr_layer())
                .init();

            WorkerLogging {
                log_file: Some(log_dir.join("worker.log")),
                _guard: Some(guard),
            }
        }
        Ok(None) | Err(_) => {
            // Fallback: stderr only
            tracing_subscriber::registry()
                .with(filter)
                .with(worker_stderr_layer())
                .init();

            WorkerLogging {
                log_file: None,
                _guard: None,
            }
        }
    }
}

/// Compact stderr output, built per subscriber stack since the layer type
/// depends on what it is stacked on
fn worker_stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_stderr_layer_stacks_with_and_without_file() {
        let with_file = tracing_subscriber::registry()
            .with(EnvFilter::new("info"))
            .with(fmt::layer().with_writer(std::io::sink).with_ansi(false))
            .with(worker_stderr_layer());
        tracing::subscriber::with_default(with_file, || tracing::info!("file and stderr"));

        let stderr_only = tracing_subscriber::registry()
            .with(EnvFilter::new("info"))
            .with(worker_stderr_layer());
        tracing::subscriber::with_default(stderr_only, || tracing::info!("stderr only"));
    }
}
