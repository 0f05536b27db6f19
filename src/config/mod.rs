//! Configuration module for keypool
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`KEYPOOL_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! Unlike cosmetic settings, a malformed limit or threshold is fatal: it is
//! rejected while loading rather than discovered at request time.
//!
//! # Example
//!
//! ```rust
//! use keypool::config::KeyPoolConfig;
//!
//! let toml = r#"
//! credentials = ["key-a", "key-b"]
//!
//! [limits]
//! default = { rpm = 5, rpd = 100 }
//!
//! [failure]
//! max_failures = 3
//! "#;
//! let config: KeyPoolConfig = toml::from_str(toml).unwrap();
//! config.validate().unwrap();
//! assert_eq!(config.credentials.len(), 2);
//! ```

pub mod cooldown;
pub mod error;
pub mod failure;
pub mod limits;
pub mod logging;

pub use cooldown::CooldownConfig;
pub use error::ConfigError;
pub use failure::FailureConfig;
pub use limits::{LimitsConfig, ModelLimits, RateLimit};
pub use logging::{LogFormat, LoggingConfig};

// Re-export HealthCheckConfig from health module
pub use crate::health::HealthCheckConfig;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

/// Unified configuration for the credential pool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KeyPoolConfig {
    /// Upstream credentials managed by the pool
    pub credentials: Vec<String>,
    /// Rate limits and overrides
    pub limits: LimitsConfig,
    /// Failure threshold and retry ceiling
    pub failure: FailureConfig,
    /// Escalating cooldown after upstream 429s
    pub cooldown: CooldownConfig,
    /// Quarantine health check scheduler
    pub health_check: HealthCheckConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl KeyPoolConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `KEYPOOL_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Present-but-malformed values are errors; absent values keep the
    /// current setting.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(keys) = lookup("KEYPOOL_API_KEYS") {
            self.credentials = parse_key_list(&keys);
        }

        if let Some(v) = lookup("KEYPOOL_DEFAULT_RPM") {
            self.limits.default.rpm = parse_var("KEYPOOL_DEFAULT_RPM", &v)?;
        }
        if let Some(v) = lookup("KEYPOOL_DEFAULT_RPD") {
            self.limits.default.rpd = parse_var("KEYPOOL_DEFAULT_RPD", &v)?;
        }
        if let Some(v) = lookup("KEYPOOL_MODEL_RATE_LIMITS") {
            self.limits.models = parse_limit_map("KEYPOOL_MODEL_RATE_LIMITS", &v)?;
        }
        if let Some(v) = lookup("KEYPOOL_KEY_RATE_LIMITS") {
            self.limits.credentials = parse_limit_map("KEYPOOL_KEY_RATE_LIMITS", &v)?;
        }

        if let Some(v) = lookup("KEYPOOL_MAX_FAILURES") {
            self.failure.max_failures = parse_var("KEYPOOL_MAX_FAILURES", &v)?;
        }
        if let Some(v) = lookup("KEYPOOL_MAX_RETRIES") {
            self.failure.max_retries = parse_var("KEYPOOL_MAX_RETRIES", &v)?;
        }

        if let Some(v) = lookup("KEYPOOL_COOLDOWN") {
            self.cooldown.enabled = v.to_lowercase() == "true";
        }
        if let Some(v) = lookup("KEYPOOL_COOLDOWN_MINUTES") {
            self.cooldown.durations_minutes = parse_minutes("KEYPOOL_COOLDOWN_MINUTES", &v)?;
        }

        if let Some(v) = lookup("KEYPOOL_HEALTH_CHECK") {
            self.health_check.enabled = v.to_lowercase() == "true";
        }
        if let Some(v) = lookup("KEYPOOL_CHECK_INTERVAL_HOURS") {
            self.health_check.check_interval_hours =
                parse_var("KEYPOOL_CHECK_INTERVAL_HOURS", &v)?;
        }
        if let Some(v) = lookup("KEYPOOL_TEST_MODEL") {
            self.health_check.test_model = v;
        }

        if let Some(level) = lookup("KEYPOOL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("KEYPOOL_LOG_FORMAT") {
            self.logging.format = LogFormat::from_str(&format).map_err(|message| {
                ConfigError::Validation {
                    field: "KEYPOOL_LOG_FORMAT".to_string(),
                    message,
                }
            })?;
        }

        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.credentials.len());
        for (i, credential) in self.credentials.iter().enumerate() {
            if credential.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("credentials[{}]", i),
                    message: "credential cannot be empty".to_string(),
                });
            }
            if !seen.insert(credential.as_str()) {
                return Err(ConfigError::DuplicateCredential(
                    crate::registry::mask_key(credential),
                ));
            }
        }

        self.limits.validate()?;

        if self.failure.max_failures == 0 {
            return Err(ConfigError::Validation {
                field: "failure.max_failures".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        self.cooldown.validate()?;
        self.health_check.validate()?;

        for component in self.logging.unknown_components() {
            tracing::warn!(component, "Log level override for an unknown component");
        }

        for credential in self.limits.credentials.keys() {
            if !seen.contains(credential.as_str()) {
                tracing::warn!(
                    credential = %crate::registry::mask_key(credential),
                    "Rate limit override for a credential that is not configured"
                );
            }
        }

        Ok(())
    }
}

/// Accepts a JSON array or a comma separated list.
fn parse_key_list(raw: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list.into_iter().map(|k| k.trim().to_string()).collect();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Validation {
        field: name.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}

/// Accepts a JSON array or a comma separated list of minutes.
fn parse_minutes(name: &str, value: &str) -> Result<Vec<u64>, ConfigError> {
    if let Ok(list) = serde_json::from_str::<Vec<u64>>(value) {
        return Ok(list);
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| parse_var(name, m))
        .collect()
}

fn parse_limit_map(name: &str, value: &str) -> Result<HashMap<String, RateLimit>, ConfigError> {
    serde_json::from_str(value).map_err(|e| ConfigError::Validation {
        field: name.to_string(),
        message: e.to_string(),
    })
}
