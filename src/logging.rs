//! Tracing setup: stderr output plus an optional daily rolling log file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// With `log_dir` set, events are also written to `poquotator.log.<date>`
/// in that directory. Keep the returned guard alive for the life of the
/// process or buffered file output is lost.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "poquotator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());

            if tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
                .is_err()
            {
                tracing::debug!("Global tracing subscriber already set");
            }
            Some(guard)
        }
        None => {
            if tracing_subscriber::registry()
                .with(stderr_layer)
                .try_init()
                .is_err()
            {
                tracing::debug!("Global tracing subscriber already set");
            }
            None
        }
    }
}
