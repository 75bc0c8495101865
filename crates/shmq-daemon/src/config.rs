// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration: the broker settings plus the control channel.

use serde::{Deserialize, Serialize};
use shmq::BrokerConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket clients connect to
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Log filter (trace, debug, info, warn, error or an env-filter directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum control message size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    #[serde(flatten)]
    pub broker: BrokerConfig,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/shmq-broker.sock")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MB
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
            max_message_size: default_max_message_size(),
            broker: BrokerConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("socket_path cannot be empty".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot be 0".into(),
            ));
        }
        self.broker.validate()?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Broker: {0}")]
    Broker(#[from] shmq::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/shmq-broker.sock"));
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_broker_fields_are_flattened() {
        let json = r#"{
            "socket_path": "/run/shmq.sock",
            "max_processes": 12,
            "process_keepalive_timeout_ms": 3000
        }"#;
        let config: DaemonConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/shmq.sock"));
        assert_eq!(config.broker.max_processes, 12);
        assert_eq!(config.broker.process_keepalive_timeout_ms, 3000);
        assert_eq!(config.broker.max_publishers, BrokerConfig::default().max_publishers);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        let config = DaemonConfig {
            log_level: "debug".into(),
            ..Default::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(DaemonConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_broker_settings_rejected() {
        let mut config = DaemonConfig::default();
        config.broker.max_processes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Broker(_))));

        let config = DaemonConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = DaemonConfig::from_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
