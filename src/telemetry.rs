//! Structured logging initialization.
//!
//! Binding, validation and dispatch report through `tracing`. This module wires
//! a `tracing-subscriber` registry with an `EnvFilter` and either a JSON
//! (production) or pretty (development) formatter.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BRRTB_LOG_LEVEL` | `info` | trace/debug/info/warn/error |
//! | `BRRTB_LOG_FORMAT` | `json` | json/pretty |
//! | `BRRTB_LOG_TARGET_FILTER` | unset | extra comma-separated directives |
//! | `BRRTB_LOG_INCLUDE_LOCATION` | `false` | include file:line |
//!
//! `RUST_LOG` takes precedence over `BRRTB_LOG_LEVEL` when set.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub level: String,
    pub format: LogFormat,
    /// Extra filter directives (comma-separated), e.g. `brrtbind::binder=debug`
    pub target_filter: Option<String>,
    /// Include file:line location (dev only)
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_from(|key| env::var(key).ok());
        config
    }

    /// Overlay values from a variable lookup onto this configuration.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("BRRTB_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = lookup("BRRTB_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Some(filter) = lookup("BRRTB_LOG_TARGET_FILTER") {
            self.target_filter = Some(filter);
        }
        if let Some(include) = lookup("BRRTB_LOG_INCLUDE_LOCATION").and_then(|s| s.parse().ok()) {
            self.include_location = include;
        }
    }

    fn level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the filter for this configuration.
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

/// Initialize the global subscriber.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use brrtbind::telemetry::{init_logging, LogConfig};
///
/// init_logging(&LogConfig::from_env()).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()
            .context("Failed to initialize JSON logging")?,
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()
            .context("Failed to initialize pretty logging")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.include_location);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("BRRTB_LOG_LEVEL", "debug"),
            ("BRRTB_LOG_FORMAT", "Pretty"),
            ("BRRTB_LOG_INCLUDE_LOCATION", "true"),
        ]
        .into_iter()
        .collect();
        let mut config = LogConfig::default();
        config.apply_env_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.include_location);
        assert_eq!(config.level(), Level::DEBUG);
    }

    #[test]
    fn test_unknown_format_falls_back_to_json() {
        assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
    }
}
