use crate::errors::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line on stdout
    Json,
}

/// `[logging]` section of the phone configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: "trace", "debug", "info", "warn" or "error".
    /// `RUST_LOG` directives are applied on top.
    pub level: String,
    pub format: LogFormat,
    /// Include source file and line
    pub source_location: bool,
    /// Log span enter/exit
    pub span_events: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            source_location: false,
            span_events: false,
            app_name: "rphone".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        Self {
            level: level.as_str().to_lowercase(),
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }
}

/// Install the global subscriber described by `config`.
///
/// Fails on an invalid level, or when a global subscriber is already set.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_span_events(if config.span_events {
            FmtSpan::ACTIVE
        } else {
            FmtSpan::NONE
        })
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.with_writer(std::io::stdout).json().try_init(),
    }
    .map_err(|e| Error::Logging(e.to_string()))
}

/// Parse a level name, case-insensitively
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("unknown log level '{}'", level)))
}

pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!(app = app_name, version, "Phone core starting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
    }

    #[test]
    fn unknown_level_is_a_config_error() {
        let err = parse_log_level("chatty").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("chatty"));
    }

    #[test]
    fn builder_sets_options() {
        let config = LoggingConfig::new(Level::DEBUG, "phone")
            .with_format(LogFormat::Json)
            .with_span_events();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert!(!config.source_location);
    }

    #[test]
    fn format_reads_from_toml() {
        let config: LoggingConfig =
            crate::config::load_toml("format = \"json\"\nsource_location = true\n").unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.source_location);
        assert_eq!(config.level, "info");
    }
}
