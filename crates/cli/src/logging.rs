//! Logging setup for the migrator binary
//!
//! Logs go to stderr so `status --json` output on stdout stays machine-readable.

use std::env;
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level filter; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    /// Load from `LOG_LEVEL` and `LOG_FORMAT`
    pub fn from_env() -> anyhow::Result<Self> {
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
        Self::parse(&level, &format)
    }

    fn parse(level: &str, format: &str) -> anyhow::Result<Self> {
        let level = level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            anyhow::bail!(
                "Invalid value for level: '{}', expected trace, debug, info, warn, or error",
                level
            );
        }

        let format = match format.to_lowercase().as_str() {
            "compact" => LogFormat::Compact,
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => anyhow::bail!(
                "Invalid value for format: '{}', expected compact, pretty, or json",
                other
            ),
        };

        Ok(Self { level, format })
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).compact())
            .try_init()?,
    }

    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
