use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `offline_worker=debug`).
pub const LOG_ENV: &str = "OFFLINE_WORKER_LOG";

fn filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to a daily-rolling file in `dir`.
///
/// The returned guard flushes pending lines on drop; keep it alive for the
/// life of the process.
pub fn init_file(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(dir, "offline-worker.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter())
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

/// Log to stderr.
pub fn init_stderr() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(filter())
    .with_writer(std::io::stderr)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}
