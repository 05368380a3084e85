use std::fs::OpenOptions;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "warn,opsdesk_core=info,opsdesk_cli=info";

/// Stderr logging filtered by `OPSDESK_LOG`, plus a debug-level file log
/// when `OPSDESK_LOG_FILE` is set.
pub fn init_tracing() -> Result<()> {
    let filter =
        EnvFilter::try_from_env("OPSDESK_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let file_layer = match std::env::var("OPSDESK_LOG_FILE").ok() {
        Some(log_path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open log file: {}", log_path))?;
            eprintln!("File logging enabled: {}", log_path);
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
