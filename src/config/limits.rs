//! Rate limit configuration and precedence resolution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::error::ConfigError;

/// Request quota for one credential/model pair.
///
/// Accepts both the table form and the `[rpm, rpd]` pair form:
///
/// ```
/// use keypool::config::RateLimit;
///
/// let table: RateLimit = serde_json::from_str(r#"{"rpm": 5, "rpd": 100}"#).unwrap();
/// let pair: RateLimit = serde_json::from_str("[5, 100]").unwrap();
/// assert_eq!(table, pair);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRateLimit")]
pub struct RateLimit {
    /// Requests per minute (short window capacity)
    pub rpm: u32,
    /// Requests per day (long window capacity)
    pub rpd: u32,
}

impl RateLimit {
    pub const fn new(rpm: u32, rpd: u32) -> Self {
        Self { rpm, rpd }
    }

    fn check(&self, field: &str) -> Result<(), ConfigError> {
        if self.rpm == 0 {
            return Err(ConfigError::Validation {
                field: format!("{}.rpm", field),
                message: "rpm must be greater than zero".to_string(),
            });
        }
        if self.rpd == 0 {
            return Err(ConfigError::Validation {
                field: format!("{}.rpd", field),
                message: "rpd must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { rpm: 5, rpd: 100 }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRateLimit {
    Pair([u32; 2]),
    Table { rpm: u32, rpd: u32 },
}

impl TryFrom<RawRateLimit> for RateLimit {
    type Error = String;

    fn try_from(raw: RawRateLimit) -> Result<Self, Self::Error> {
        let (rpm, rpd) = match raw {
            RawRateLimit::Pair([rpm, rpd]) => (rpm, rpd),
            RawRateLimit::Table { rpm, rpd } => (rpm, rpd),
        };
        if rpm == 0 || rpd == 0 {
            return Err(format!(
                "rate limit must be positive, got rpm={} rpd={}",
                rpm, rpd
            ));
        }
        Ok(Self { rpm, rpd })
    }
}

/// Rate limit section of the configuration file.
///
/// ```toml
/// [limits]
/// default = { rpm = 5, rpd = 100 }
///
/// [limits.models]
/// "gemini-1.5-pro" = [2, 50]
///
/// [limits.credentials]
/// "AIzaSy-paid-key" = { rpm = 60, rpd = 10000 }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Global default applied when no override matches
    pub default: RateLimit,
    /// Per-model overrides
    pub models: HashMap<String, RateLimit>,
    /// Per-credential overrides (apply to every model on that credential)
    pub credentials: HashMap<String, RateLimit>,
}

impl LimitsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default.check("limits.default")?;
        for (model, limit) in &self.models {
            limit.check(&format!("limits.models.{}", model))?;
        }
        for (credential, limit) in &self.credentials {
            limit.check(&format!(
                "limits.credentials.{}",
                crate::registry::mask_key(credential)
            ))?;
        }
        Ok(())
    }
}

/// Resolved, read-only limit table.
///
/// Precedence: per-credential override > per-model override > global default.
#[derive(Debug, Clone, Default)]
pub struct ModelLimits {
    default: RateLimit,
    models: HashMap<String, RateLimit>,
    credentials: HashMap<String, RateLimit>,
}

impl ModelLimits {
    /// Build the resolver, validating every entry.
    pub fn from_config(config: &LimitsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            default: config.default,
            models: config.models.clone(),
            credentials: config.credentials.clone(),
        })
    }

    /// Uniform limits for every credential and model.
    pub fn uniform(limit: RateLimit) -> Self {
        Self {
            default: limit,
            ..Default::default()
        }
    }

    /// Limit that applies to `credential_id` when serving `model`.
    pub fn resolve(&self, credential_id: &str, model: &str) -> RateLimit {
        self.credentials
            .get(credential_id)
            .or_else(|| self.models.get(model))
            .copied()
            .unwrap_or(self.default)
    }
}
