// Logging module - Logging infrastructure
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use std::io;

/// Initialize logging system.
///
/// `RUST_LOG` takes precedence over `level`. Thread names are included so
/// reader, writer and heartbeat output can be told apart.
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("thermolink={},warn", level)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_names(true)
                .with_line_number(true)
        )
        .try_init()?;

    tracing::debug!("ThermoLink logging initialized at '{}'", level);
    Ok(())
}
