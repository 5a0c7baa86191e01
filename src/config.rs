//! Optional JSON settings file with `HOST_SCAN_*` environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logging::LogFormat;

pub const DEFAULT_CONFIG_PATH: &str = "host-scan.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub ping: PingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Port spec used when none is given on the command line.
    pub port_range: Option<String>,
    pub timeout_ms: u64,
    pub concurrency: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            port_range: None,
            timeout_ms: 3000,
            concurrency: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingSettings {
    pub count: u32,
    pub timeout_ms: u64,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            count: 4,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: LogFormat::Compact,
        }
    }
}

impl AppConfig {
    /// Load `path` if it exists, otherwise fall back to defaults.
    /// A file that exists but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `HOST_SCAN_*` environment variables. Unparseable values are ignored.
    pub fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("HOST_SCAN_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.scan.timeout_ms = v;
        }
        if let Some(v) = var("HOST_SCAN_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.scan.concurrency = v;
        }
        if let Some(v) = var("HOST_SCAN_PING_COUNT").and_then(|v| v.parse().ok()) {
            self.ping.count = v;
        }
        if let Some(v) = var("HOST_SCAN_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = var("HOST_SCAN_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            self.logging.format = v;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = AppConfig::from_json(r#"{ "scan": { "concurrency": 200 } }"#).unwrap();
        assert_eq!(cfg.scan.concurrency, 200);
        assert_eq!(cfg.scan.timeout_ms, 3000);
        assert_eq!(cfg.ping, PingSettings::default());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn logging_format_parses() {
        let cfg = AppConfig::from_json(r#"{ "logging": { "format": "json" } }"#).unwrap();
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(AppConfig::from_json("{ scan: ").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = AppConfig::load("definitely/not/here/host-scan.json").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("HOST_SCAN_TIMEOUT_MS", "750"),
            ("HOST_SCAN_CONCURRENCY", "not-a-number"),
            ("HOST_SCAN_LOG_LEVEL", "debug"),
            ("HOST_SCAN_LOG_FORMAT", "pretty"),
        ]
        .into_iter()
        .collect();
        let cfg = AppConfig::default().merge_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.scan.timeout_ms, 750);
        assert_eq!(cfg.scan.concurrency, 50);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }
}
