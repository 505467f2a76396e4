use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config;

/// Initialize logging to stderr and to a daily-rotated JSON file in `log_dir`.
/// Stdout stays reserved for the operator-facing output.
pub fn init_logging(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, config::LOG_FILE_PREFIX);

    tracing_subscriber::registry()
        .with(
            // Console output
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_ansi(true),
        )
        .with(
            // File output with JSON formatting
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_line_number(true)
                .with_ansi(false)
                .json(),
        )
        .with(
            // RUST_LOG overrides; default info for this crate, warn for dependencies
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gex_levels=info,warn")),
        )
        .try_init()
        .context("Logging already initialized")?;

    Ok(())
}
