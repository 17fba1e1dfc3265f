use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// Initialize logging to the console and to an append-only log file
///
/// `RUST_LOG` overrides `level` when set. Returns the resolved log path.
///
/// # Errors
/// Returns error if the log file cannot be opened, `level` is not a valid
/// filter, or a global subscriber is already installed
pub fn init(level: &str, log_path: &str) -> Result<PathBuf> {
    let expanded_path = Config::expand_path(log_path)?;

    // Create parent directory if needed
    if let Some(parent) = expanded_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&expanded_path)
        .context("failed to open log file")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_target(false)
                .with_ansi(false),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!("telemetry initialized: {}", expanded_path.display());

    Ok(expanded_path)
}
