//! # Configuration Module
//!
//! [`BindConfig`] controls request limits, schema links and dispatch defaults.
//! It can be built in code, loaded from a YAML, JSON or TOML file, and is
//! always overlaid with environment variables.
//!
//! ## Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BRRTB_MAX_BODY_BYTES` | `max_body_bytes` (decimal or `0x` hex) |
//! | `BRRTB_SCHEMAS_PATH` | `schemas_path` |
//! | `BRRTB_SCHEMA_BASE_URL` | `schema_base_url` |
//! | `BRRTB_STRICT_ONE_OF` | `strict_one_of` |
//! | `BRRTB_DEFAULT_FORMAT` | `default_format` (`json`/`yaml`) |
//! | `BRRTB_DEFAULT_STATUS` | `default_status` |
//!
//! Logging variables are documented in [`crate::telemetry`].
//!
//! ## Example
//!
//! ```yaml
//! max_body_bytes: 65536
//! schemas_path: /schemas
//! strict_one_of: true
//! log:
//!   level: debug
//!   format: pretty
//! ```

use crate::dispatcher::Format;
use crate::telemetry::LogConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::info;

/// Default request body limit: 1 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Global request body limit; operations may override it.
    pub max_body_bytes: usize,
    /// Path prefix of the schema document endpoint.
    pub schemas_path: String,
    /// Base URL for `$schema` links; `https://<Host>` when unset.
    pub schema_base_url: Option<String>,
    /// Reject `oneOf` values matching several variants.
    pub strict_one_of: bool,
    /// Encoding used when `Accept` expresses no preference.
    pub default_format: Format,
    /// Status written when an output has no body shape present.
    pub default_status: u16,
    pub log: LogConfig,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            schemas_path: "/schemas".to_string(),
            schema_base_url: None,
            strict_one_of: false,
            default_format: Format::Json,
            default_status: 204,
            log: LogConfig::default(),
        }
    }
}

impl BindConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load from a file chosen by extension (`yaml`/`yml`, `json`, `toml`),
    /// then overlay environment variables.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, the extension is unknown or the
    /// contents do not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mut config: BindConfig = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid YAML config {}", path.display()))?,
            "json" => serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON config {}", path.display()))?,
            "toml" => toml::from_str(&text)
                .with_context(|| format!("Invalid TOML config {}", path.display()))?,
            other => bail!("Unsupported config extension `{other}` for {}", path.display()),
        };
        config.apply_env();
        info!(
            path = %path.display(),
            max_body_bytes = config.max_body_bytes,
            schemas_path = %config.schemas_path,
            strict_one_of = config.strict_one_of,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Overlay process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    /// Overlay values from a variable lookup. Unparseable values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(limit) = lookup("BRRTB_MAX_BODY_BYTES").and_then(|v| parse_size(&v)) {
            self.max_body_bytes = limit;
        }
        if let Some(path) = lookup("BRRTB_SCHEMAS_PATH") {
            self.schemas_path = path;
        }
        if let Some(base) = lookup("BRRTB_SCHEMA_BASE_URL") {
            self.schema_base_url = Some(base.trim_end_matches('/').to_string());
        }
        if let Some(strict) = lookup("BRRTB_STRICT_ONE_OF").and_then(|v| v.parse().ok()) {
            self.strict_one_of = strict;
        }
        if let Some(format) = lookup("BRRTB_DEFAULT_FORMAT") {
            self.default_format = Format::parse(&format);
        }
        if let Some(status) = lookup("BRRTB_DEFAULT_STATUS").and_then(|v| v.parse().ok()) {
            self.default_status = status;
        }
        self.log.apply_env_from(&lookup);
    }
}

fn parse_size(val: &str) -> Option<usize> {
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BindConfig::default();
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.schemas_path, "/schemas");
        assert_eq!(config.default_status, 204);
        assert!(!config.strict_one_of);
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("BRRTB_MAX_BODY_BYTES", "0x400"),
            ("BRRTB_SCHEMA_BASE_URL", "https://api.example.com/"),
            ("BRRTB_STRICT_ONE_OF", "true"),
            ("BRRTB_DEFAULT_FORMAT", "yaml"),
            ("BRRTB_DEFAULT_STATUS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut config = BindConfig::default();
        config.apply_env_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.schema_base_url.as_deref(), Some("https://api.example.com"));
        assert!(config.strict_one_of);
        assert_eq!(config.default_format, Format::Yaml);
        assert_eq!(config.default_status, 204);
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("bind.yaml");
        std::fs::File::create(&yaml)
            .unwrap()
            .write_all(b"max_body_bytes: 10\nlog:\n  level: debug\n")
            .unwrap();
        let config = BindConfig::load(&yaml).unwrap();
        assert_eq!(config.log.level, "debug");

        let toml_path = dir.path().join("bind.toml");
        std::fs::write(&toml_path, "strict_one_of = true\nschemas_path = \"/docs/schemas\"\n")
            .unwrap();
        let config = BindConfig::load(&toml_path).unwrap();
        assert!(config.strict_one_of);
        assert_eq!(config.schemas_path, "/docs/schemas");

        let ini = dir.path().join("bind.ini");
        std::fs::write(&ini, "x=1").unwrap();
        assert!(BindConfig::load(&ini).is_err());
    }
}
