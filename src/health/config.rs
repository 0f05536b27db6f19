//! Configuration for the quarantine health check scheduler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;

/// Configuration for probing quarantined credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Whether the background scheduler runs
    pub enabled: bool,
    /// Hours between probe cycles
    pub check_interval_hours: u64,
    /// Timeout for each probe
    pub probe_timeout_seconds: u64,
    /// Probes in flight at once
    pub max_concurrent_probes: usize,
    /// Model used for probe requests
    pub test_model: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_hours: 1,
            probe_timeout_seconds: 30,
            max_concurrent_probes: 8,
            test_model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("health_check.check_interval_hours", self.check_interval_hours),
            ("health_check.probe_timeout_seconds", self.probe_timeout_seconds),
            (
                "health_check.max_concurrent_probes",
                self.max_concurrent_probes as u64,
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.test_model.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "health_check.test_model".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}
