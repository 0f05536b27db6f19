//! Failure and retry policy configuration

use serde::{Deserialize, Serialize};

/// Failure tracking and caller retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    /// Consecutive failures before a credential is quarantined
    pub max_failures: u32,
    /// Retries a dispatch session may make after the first attempt
    pub max_retries: u32,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            max_retries: 3,
        }
    }
}
