//! File logging. The terminal belongs to the UI, so everything goes to a daily
//! rolling file under the data directory.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,gg_shuffle=debug";

/// Install the global subscriber. Keep the returned guard alive for the whole run,
/// dropping it flushes buffered lines.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

  let file_appender = tracing_appender::rolling::daily(log_dir, "gg-shuffle.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(true))
    .try_init()
    .context("Failed to install tracing subscriber")?;

  Ok(guard)
}
