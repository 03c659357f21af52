//! Log sink setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dirsync_sync::{LogFormat, LoggingConfig};

/// Install the global subscriber, writing to stderr.
///
/// The filter comes from `RUST_LOG`, then the configured level, then
/// `fallback`.
pub fn init_logging(config: &LoggingConfig, fallback: &str) -> anyhow::Result<()> {
    let directive = config.level.as_deref().unwrap_or(fallback);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive)
            .map_err(|e| anyhow::anyhow!("invalid log level '{directive}': {e}"))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?,
    }

    tracing::debug!(directive = %directive, format = ?config.format, "Logging initialized");
    Ok(())
}
