//! Structured logging setup.
//!
//! Logging goes to stderr by default, in a human-readable format; JSON
//! output and an optional log file are available for production
//! deployments. The configured level can be raised from the command line
//! with `-v` (debug) and `-vv` (trace) without touching the config file.

use paygate_core::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Errors from logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level string is not a valid filter directive.
    #[error("invalid log level: {level}")]
    InvalidLevel {
        /// The rejected level string.
        level: String,
    },

    /// The format string is not a known output format.
    #[error("invalid log format: {format} (expected \"pretty\" or \"json\")")]
    InvalidFormat {
        /// The rejected format string.
        format: String,
    },

    /// The log file could not be opened.
    #[error("failed to open log file: {0}")]
    File(#[from] std::io::Error),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {context}")]
    Init {
        /// Context from the subscriber registry.
        context: String,
    },
}

/// Installs the global tracing subscriber.
///
/// `verbose` overrides the configured level: `-v` forces `debug`, `-vv`
/// and beyond force `trace`.
///
/// # Errors
///
/// Returns [`LogError`] for an unparseable level, an unknown format, an
/// unopenable log file, or a second initialization in the same process.
pub fn init_logging(config: &LoggingConfig, verbose: u8) -> Result<(), LogError> {
    let level = match verbose {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_new(level).map_err(|_| LogError::InvalidLevel {
        level: level.to_string(),
    })?;

    let json = match config.format.as_str() {
        "pretty" => false,
        "json" => true,
        other => {
            return Err(LogError::InvalidFormat {
                format: other.to_string(),
            })
        }
    };

    let file = config
        .file
        .as_ref()
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Arc::new)
        })
        .transpose()?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match (json, file) {
        (false, None) => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        (false, Some(file)) => registry
            .with(fmt::layer().with_ansi(false).with_writer(file))
            .try_init(),
        (true, None) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (true, Some(file)) => registry
            .with(fmt::layer().json().with_writer(file))
            .try_init(),
    };
    result.map_err(|e| LogError::Init {
        context: e.to_string(),
    })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_rejected() {
        let config = LoggingConfig {
            format: "xml".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(&config, 0),
            Err(LogError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_bad_level_rejected() {
        let config = LoggingConfig {
            level: "very loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(&config, 0),
            Err(LogError::InvalidLevel { .. })
        ));
    }
}
