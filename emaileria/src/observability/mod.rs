//! Logging setup
//!
//! Installs a `tracing` subscriber writing to stderr, so terminal progress
//! output on stdout is never interleaved with log lines.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingSettings};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level
///
/// An unparsable configured level falls back to `info`.
#[must_use]
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global subscriber
///
/// # Example
///
/// ```rust,no_run
/// use emaileria::config::LoggingSettings;
/// use emaileria::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init(&LoggingSettings::default())?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(settings));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match settings.format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        LogFormat::Json => registry.with(layer.json()).try_init()?,
    }

    Ok(())
}
