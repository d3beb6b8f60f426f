//! Logging setup
//!
//! Logs go to stdout and, when a directory is configured, to a daily rolling
//! file written by a background worker. The returned guard flushes that
//! worker on drop and must be kept alive by the caller.

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::utils::errors::{CastpodError, Result};

/// Initialize logging based on configuration. `RUST_LOG` wins over the
/// configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| CastpodError::Config(format!("Invalid log filter: {}", e)))?;

    let stdout = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed()
    };

    let (file, guard) = match &config.directory {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init()
        .map_err(|e| CastpodError::Config(format!("Logging already initialized: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    if guard.is_none() {
        warn!("No log directory configured, logging to stdout only");
    }
    Ok(guard)
}

/// Log a handled command with structured data
pub fn log_command(user_id: Option<i64>, chat_id: Option<i64>, command: &str) {
    info!(
        user_id = user_id,
        chat_id = chat_id,
        command = command,
        "Command handled"
    );
}

/// Log a subscription change
pub fn log_subscription_change(user_id: i64, feed_url: &str, subscribed: bool) {
    info!(
        user_id = user_id,
        feed_url = feed_url,
        subscribed = subscribed,
        "Subscription changed"
    );
}
