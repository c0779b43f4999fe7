//! Session configuration.
//!
//! Socket-level settings applied when a session dials or attaches to a
//! connection. The protocol itself has no timeouts; a deadline set here makes
//! a blocked read or write fail with [`ProtocolError::Timeout`].
//!
//! Configuration is read from TOML:
//!
//! ```toml
//! connect_timeout_secs = 10
//! read_timeout_secs = 30
//! nodelay = true
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ProtocolError, Result};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than 0 seconds when set")]
    ZeroTimeout { field: &'static str },

    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidEnvValue { var: &'static str, value: String },
}

impl From<ConfigError> for ProtocolError {
    fn from(err: ConfigError) -> Self {
        ProtocolError::Config(err.to_string())
    }
}

/// Environment variable overriding [`SessionConfig::read_timeout_secs`].
pub const ENV_READ_TIMEOUT: &str = "FERRY_READ_TIMEOUT";

/// Environment variable overriding [`SessionConfig::write_timeout_secs`].
pub const ENV_WRITE_TIMEOUT: &str = "FERRY_WRITE_TIMEOUT";

/// Socket settings for a session's connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Give up dialing after this many seconds. `None` waits for the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    /// Fail a blocked read after this many seconds. `None` blocks forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,

    /// Fail a blocked write after this many seconds. `None` blocks forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_secs: Option<u64>,

    /// Disable Nagle's algorithm so small handshake frames go out immediately.
    pub nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: None,
            read_timeout_secs: None,
            write_timeout_secs: None,
            nodelay: true,
        }
    }
}

impl SessionConfig {
    /// Dial deadline as a [`Duration`].
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Read deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs.map(Duration::from_secs)
    }

    /// Validate the configuration values.
    ///
    /// A zero deadline is rejected: the standard library refuses
    /// `Duration::ZERO` as a socket timeout.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let timeouts = [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
            ("write_timeout_secs", self.write_timeout_secs),
        ];
        for (field, value) in timeouts {
            if value == Some(0) {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - FERRY_READ_TIMEOUT: read deadline in seconds
    /// - FERRY_WRITE_TIMEOUT: write deadline in seconds
    pub fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets = [
            (ENV_READ_TIMEOUT, &mut self.read_timeout_secs),
            (ENV_WRITE_TIMEOUT, &mut self.write_timeout_secs),
        ];
        for (var, slot) in targets {
            let Some(value) = lookup(var).filter(|v| !v.is_empty()) else {
                continue;
            };
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    var,
                    value: value.clone(),
                })?;
            tracing::info!(var, secs, "Overriding session timeout from environment");
            *slot = Some(secs);
        }
        Ok(())
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ProtocolError::Config(e.to_string()))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Session config not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ProtocolError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }
}
