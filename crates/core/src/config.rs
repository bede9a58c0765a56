//! Configuration management for CoEpi.
//!
//! `ProtocolConfig` is immutable once built and handed to every component at
//! construction. Runtime reconfiguration means building a new config and
//! restarting the affected components, never mutating one in place.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::SECONDS_PER_DAY;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Construction used to derive identifiers from a rotating key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierScheme {
    /// Keyed BLAKE3 over the rounded timestamp
    #[default]
    Blake3Mac,
    /// AES-128 over the PKCS#7 padded 4-byte rounded timestamp
    Aes128Ecb,
}

/// Timing parameters of the identifier protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Lifetime of a rotating key
    pub key_lifetime_secs: u64,
    /// Lifetime of a broadcast identifier
    pub identifier_lifetime_secs: u64,
    /// Trailing window searched when matching published keys
    pub match_window_days: u64,
    /// Period of the published-key check loop
    pub periodic_check_secs: u64,
    /// Identifier derivation construction
    pub identifier_scheme: IdentifierScheme,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            key_lifetime_secs: 7 * SECONDS_PER_DAY,
            identifier_lifetime_secs: 15 * 60,
            match_window_days: 7,
            periodic_check_secs: 30 * 60,
            identifier_scheme: IdentifierScheme::default(),
        }
    }
}

impl ProtocolConfig {
    /// Match window in seconds.
    pub fn match_window_secs(&self) -> u64 {
        self.match_window_days * SECONDS_PER_DAY
    }

    /// Number of candidate identifiers regenerated per published key.
    pub fn candidate_count(&self) -> usize {
        (self.match_window_secs() / self.identifier_lifetime_secs) as usize + 1
    }

    /// Keys a symptom report must carry so that every identifier broadcast
    /// during the match window can be regenerated.
    pub fn report_key_count(&self) -> usize {
        self.match_window_secs().div_ceil(self.key_lifetime_secs) as usize + 1
    }

    /// Reject values that would stall the schedulers or the matcher.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_lifetime_secs == 0 {
            return Err(ConfigError::Invalid(
                "key_lifetime_secs must be greater than zero".to_string(),
            ));
        }
        if self.identifier_lifetime_secs == 0 {
            return Err(ConfigError::Invalid(
                "identifier_lifetime_secs must be greater than zero".to_string(),
            ));
        }
        if self.match_window_days == 0 {
            return Err(ConfigError::Invalid(
                "match_window_days must be greater than zero".to_string(),
            ));
        }
        if self.periodic_check_secs == 0 {
            return Err(ConfigError::Invalid(
                "periodic_check_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote report service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the report service
    pub base_url: String,
    /// Upper bound for any single request
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Observations older than this are pruned; `None` keeps everything
    pub observation_retention_days: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("coepi.db"),
            observation_retention_days: None,
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Full node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub protocol: ProtocolConfig,
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.protocol.validate()?;

        if self.service.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(retention) = self.storage.observation_retention_days {
            if retention < self.protocol.match_window_days {
                return Err(ConfigError::Invalid(format!(
                    "observation_retention_days ({}) is shorter than match_window_days ({})",
                    retention, self.protocol.match_window_days
                )));
            }
        }
        Ok(())
    }
}
