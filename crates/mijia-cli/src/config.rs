//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default device address or name
    #[serde(default)]
    pub device: Option<String>,

    /// Discovery and connection timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Notification wait limit in seconds (waits indefinitely when unset)
    #[serde(default)]
    pub notification_timeout: Option<u64>,

    /// Default output format (text, json, csv)
    #[serde(default)]
    pub format: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mijia")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        let path = Self::path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load config from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to a specific file, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

/// Resolve device from arg (or MIJIA_DEVICE, which clap folds into it), then config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device.or_else(|| config.device.clone())
}

/// Resolve timeout: use provided value, fall back to config, then default
pub fn resolve_timeout(cmd_timeout: u64, config: &Config, default: u64) -> u64 {
    // A value equal to clap's default was most likely not typed
    if cmd_timeout != default {
        cmd_timeout
    } else {
        config.timeout.unwrap_or(default)
    }
}

/// Resolve the output format: explicit flag, then config, then text.
pub fn resolve_format(format: Option<OutputFormat>, config: &Config) -> OutputFormat {
    format
        .or_else(|| {
            config
                .format
                .as_deref()
                .and_then(|f| OutputFormat::from_str(f, true).ok())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        let result = resolve_device(Some("arg-device".to_string()), &config);
        assert_eq!(result, Some("arg-device".to_string()));
    }

    #[test]
    fn test_resolve_device_falls_back_to_config() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_device(None, &config), Some("config-device".to_string()));
        assert_eq!(resolve_device(None, &Config::default()), None);
    }

    #[test]
    fn test_resolve_timeout() {
        let config = Config {
            timeout: Some(60),
            ..Default::default()
        };
        assert_eq!(resolve_timeout(45, &config, 15), 45);
        assert_eq!(resolve_timeout(15, &config, 15), 60);
        assert_eq!(resolve_timeout(15, &Config::default(), 15), 15);
    }

    #[test]
    fn test_resolve_format() {
        let config = Config {
            format: Some("JSON".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_format(Some(OutputFormat::Csv), &config), OutputFormat::Csv);
        assert_eq!(resolve_format(None, &config), OutputFormat::Json);
        assert_eq!(resolve_format(None, &Config::default()), OutputFormat::Text);

        let bogus = Config {
            format: Some("yaml".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_format(None, &bogus), OutputFormat::Text);
    }

    #[test]
    fn test_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            device: Some("E7:2E:00:AA:BB:CC".to_string()),
            timeout: Some(20),
            notification_timeout: Some(30),
            format: Some("json".to_string()),
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("device = \"LYWSD02\"\n").unwrap();
        assert_eq!(config.device.as_deref(), Some("LYWSD02"));
        assert_eq!(config.timeout, None);
        assert_eq!(config.notification_timeout, None);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout = \"soon\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
