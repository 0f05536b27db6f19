//! Escalating cooldown after upstream 429 responses

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;

/// Cooldown applied to a credential each time upstream answers 429.
///
/// The n-th consecutive 429 benches the credential for
/// `durations_minutes[n % len]` minutes, so the ladder climbs and then
/// starts over from the first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub enabled: bool,
    /// Cooldown length per escalation level
    pub durations_minutes: Vec<u64>,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            durations_minutes: vec![1, 5, 15, 30, 60],
        }
    }
}

impl CooldownConfig {
    /// Ladder of cooldown lengths; empty when disabled.
    pub fn durations(&self) -> Vec<Duration> {
        if !self.enabled {
            return Vec::new();
        }
        self.durations_minutes
            .iter()
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.durations_minutes.is_empty() {
            return Err(ConfigError::Validation {
                field: "cooldown.durations_minutes".to_string(),
                message: "needs at least one step when cooldown is enabled".to_string(),
            });
        }
        if let Some(i) = self.durations_minutes.iter().position(|m| *m == 0) {
            return Err(ConfigError::Validation {
                field: format!("cooldown.durations_minutes[{}]", i),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
