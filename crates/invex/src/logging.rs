//! Process-wide logging setup.
//!
//! Library code logs through the `log` facade and `tracing` spans; both end
//! up in the same `tracing-subscriber` pipeline.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const DEVELOPER_FILTER: &str = "info,invex=debug";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records into tracing: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(developer_mode: bool) -> &'static str {
    if developer_mode {
        DEVELOPER_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(developer_mode: bool, format: LogFormat) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(developer_mode)));

    let json = format == LogFormat::Json;
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)));

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    log::debug!("Logging initialized (developer_mode: {})", developer_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "info,invex=debug");
    }

    #[test]
    fn test_second_init_fails() {
        let first = init_logging(false, LogFormat::Text);
        let second = init_logging(false, LogFormat::Json);
        // Another test binary may have installed a subscriber first.
        if first.is_ok() {
            assert!(second.is_err());
        }
    }
}
