//! Logging system setup.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn setup_logging(config: &LoggingSettings) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", config.level);
    Ok(())
}
