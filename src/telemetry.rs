//! Tracing subscriber setup for hosts embedding the kernel.
//!
//! Library code only emits `tracing` events; installing a subscriber is the host's call.
//! `init_tracing` is the stock setup: `RUST_LOG` filter, `LOG_FORMAT=json|pretty`.

use tracing_subscriber::{fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "topoview_kernel=info";

/// Error type for subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl LogFormat {
    /// Parse log format from string. Unknown values fall back to JSON.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Self::Pretty,
            _ => Self::Json,
        }
    }

    /// Read `LOG_FORMAT`.
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|v| Self::from_str(&v))
            .unwrap_or_default()
    }
}

/// Install the global subscriber from `RUST_LOG` and `LOG_FORMAT`.
pub fn init_tracing() -> Result<(), TelemetryError> {
    init_tracing_with(LogFormat::from_env())
}

/// Install the global subscriber with an explicit format.
pub fn init_tracing_with(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_str("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str(" PRETTY "), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str("bogus"), LogFormat::Json);
    }

    #[test]
    fn test_second_install_fails() {
        // whichever call installs first wins; the other must report an error
        let first = init_tracing_with(LogFormat::Pretty);
        let second = init_tracing_with(LogFormat::Json);
        assert!(first.is_err() || second.is_err());
    }
}
