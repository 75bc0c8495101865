// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker configuration.

use crate::version::CompatibilityCheckLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Maximum number of registered processes
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,

    /// Capacity of the publisher port pool
    #[serde(default = "default_max_publishers")]
    pub max_publishers: usize,

    /// Capacity of the subscriber port pool
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    /// Capacity of the interface (gateway) port pool
    #[serde(default = "default_max_interfaces")]
    pub max_interfaces: usize,

    /// Period of the discovery loop (milliseconds)
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_ms: u64,

    /// Heartbeat period clients are asked to keep (milliseconds)
    #[serde(default = "default_keepalive_interval")]
    pub process_keepalive_interval_ms: u64,

    /// Heartbeat age after which a monitored process is evicted (milliseconds)
    #[serde(default = "default_keepalive_timeout")]
    pub process_keepalive_timeout_ms: u64,

    /// Grace period between SIGTERM and SIGKILL at shutdown (milliseconds)
    #[serde(default = "default_termination_delay")]
    pub process_termination_delay_ms: u64,

    /// Introspection publish period (milliseconds)
    #[serde(default = "default_introspection_interval")]
    pub introspection_interval_ms: u64,

    /// Chunk size of the broker's own memory pool
    #[serde(default = "default_introspection_chunk_size")]
    pub introspection_chunk_size: usize,

    /// Chunk count of the broker's own memory pool
    #[serde(default = "default_introspection_chunk_count")]
    pub introspection_chunk_count: usize,

    /// Chunk size of each per-user memory pool
    #[serde(default = "default_user_chunk_size")]
    pub user_chunk_size: usize,

    /// Chunk count of each per-user memory pool
    #[serde(default = "default_user_chunk_count")]
    pub user_chunk_count: usize,

    /// Version check applied to registering processes
    #[serde(default)]
    pub compatibility_check: CompatibilityCheckLevel,

    /// Allow processes to request liveness monitoring
    #[serde(default = "default_true")]
    pub monitoring: bool,
}

fn default_max_processes() -> usize {
    300
}

fn default_max_publishers() -> usize {
    512
}

fn default_max_subscribers() -> usize {
    1024
}

fn default_max_interfaces() -> usize {
    4
}

fn default_discovery_interval() -> u64 {
    100
}

fn default_keepalive_interval() -> u64 {
    300
}

fn default_keepalive_timeout() -> u64 {
    1500
}

fn default_termination_delay() -> u64 {
    1000
}

fn default_introspection_interval() -> u64 {
    1000
}

fn default_introspection_chunk_size() -> usize {
    64 * 1024
}

fn default_introspection_chunk_count() -> usize {
    64
}

fn default_user_chunk_size() -> usize {
    4096
}

fn default_user_chunk_count() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_processes: default_max_processes(),
            max_publishers: default_max_publishers(),
            max_subscribers: default_max_subscribers(),
            max_interfaces: default_max_interfaces(),
            discovery_interval_ms: default_discovery_interval(),
            process_keepalive_interval_ms: default_keepalive_interval(),
            process_keepalive_timeout_ms: default_keepalive_timeout(),
            process_termination_delay_ms: default_termination_delay(),
            introspection_interval_ms: default_introspection_interval(),
            introspection_chunk_size: default_introspection_chunk_size(),
            introspection_chunk_count: default_introspection_chunk_count(),
            user_chunk_size: default_user_chunk_size(),
            user_chunk_count: default_user_chunk_count(),
            compatibility_check: CompatibilityCheckLevel::default(),
            monitoring: true,
        }
    }
}

impl BrokerConfig {
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

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.process_keepalive_interval_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.process_keepalive_timeout_ms)
    }

    pub fn termination_delay(&self) -> Duration {
        Duration::from_millis(self.process_termination_delay_ms)
    }

    pub fn introspection_interval(&self) -> Duration {
        Duration::from_millis(self.introspection_interval_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("max_processes", self.max_processes as u64),
            ("max_publishers", self.max_publishers as u64),
            ("max_subscribers", self.max_subscribers as u64),
            ("max_interfaces", self.max_interfaces as u64),
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("process_keepalive_interval_ms", self.process_keepalive_interval_ms),
            ("process_keepalive_timeout_ms", self.process_keepalive_timeout_ms),
            ("introspection_interval_ms", self.introspection_interval_ms),
            ("introspection_chunk_size", self.introspection_chunk_size as u64),
            ("introspection_chunk_count", self.introspection_chunk_count as u64),
            ("user_chunk_size", self.user_chunk_size as u64),
            ("user_chunk_count", self.user_chunk_count as u64),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue(format!("{} cannot be 0", name)));
        }
        if self.process_keepalive_timeout_ms <= self.process_keepalive_interval_ms {
            return Err(ConfigError::InvalidValue(
                "process_keepalive_timeout_ms must exceed process_keepalive_interval_ms".into(),
            ));
        }
        Ok(())
    }
}
