//! Tracing setup: console output plus the append-only diagnostic trail.
//!
//! The diagnostic trail lives next to the queue in the data directory so
//! delivery failures can be inspected after the fact.

use crate::config::Config;
use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive; flushes on drop.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

pub fn init(config: &Config) -> anyhow::Result<LoggingGuard> {
    let dir = &config.storage.data_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data directory {:?}", dir))?;

    let file_appender = tracing_appender::rolling::never(dir, &config.logging.diagnostic_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let trail_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(trail_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::info!(
        trail = %config.diagnostic_path().display(),
        level = %config.logging.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}
