//! Tracing setup for the companion process.
//!
//! Output goes to `~/.hydra-companion/logs/companion.log` through a
//! non-blocking writer. The filter comes from `HYDRA_COMPANION_LOG`
//! (e.g. `debug`, `hydra_companion::ws=trace`), defaulting to `info`.

use crate::paths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "HYDRA_COMPANION_LOG";
const LOG_FILE_NAME: &str = "companion.log";

/// Installs the global subscriber.
///
/// The returned guard flushes buffered lines when dropped, so `main` must keep
/// it alive. Falls back to stderr when the log directory is unavailable.
pub fn init() -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    match paths::logs_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .try_init()
                .is_ok();
            installed.then_some(guard)
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!(error = %e, "log directory unavailable, logging to stderr");
            None
        }
    }
}
