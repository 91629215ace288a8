//! Tunnel timing and naming configuration.

use crate::domain::bridge_name;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval between bridge readiness checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// How long to wait for a bridge frame before giving up.
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 2000;
/// Prefix of the frame name a domain publishes its bridge under.
pub const DEFAULT_BRIDGE_NAME_PREFIX: &str = "__interframe_bridge__";

/// Configuration for bridge discovery.
///
/// The defaults are the interoperable values; peers built with other values
/// will not find each other's bridges in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub poll_interval_ms: u64,
    pub bridge_timeout_ms: u64,
    pub bridge_name_prefix: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            bridge_timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
            bridge_name_prefix: DEFAULT_BRIDGE_NAME_PREFIX.to_string(),
        }
    }
}

impl TunnelConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.bridge_timeout_ms < self.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "bridge_timeout_ms ({}) is shorter than poll_interval_ms ({})",
                self.bridge_timeout_ms, self.poll_interval_ms
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }

    /// Frame name of the bridge published by `domain`.
    pub fn bridge_name(&self, domain: &str) -> String {
        bridge_name(&self.bridge_name_prefix, domain)
    }
}

/// Error loading a [`TunnelConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
