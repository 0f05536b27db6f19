//! `[logging]` section: level, output format and per-module overrides.
//!
//! Logs always go to stderr, so `keypool keys list --json` and
//! `keypool simulate --json` stay parseable on stdout. `RUST_LOG`, when set,
//! replaces everything configured here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Modules that accept a `component_levels` override. Each maps to the
/// `keypool::<module>` tracing target.
pub const COMPONENTS: &[&str] = &[
    "cli",
    "config",
    "dispatch",
    "health",
    "metrics",
    "pool",
    "ratelimit",
    "registry",
    "usage",
];

/// Log output format, also settable through `KEYPOOL_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line human output for a terminal
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Where keypool's tracing output goes and how verbose it is.
///
/// Credential ids are masked in every event regardless of level, so raising
/// `dispatch` to `trace` to follow each examined candidate is safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base filter, e.g. `info`. Overridden by `--log-level` and
    /// `KEYPOOL_LOG_LEVEL`.
    pub level: String,
    pub format: LogFormat,
    /// Per-module levels, e.g. `{ dispatch = "debug", health = "warn" }`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_levels: Option<HashMap<String, String>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: None,
        }
    }
}

impl LoggingConfig {
    /// Configured component names that match no keypool module, sorted.
    /// Their directives would silently filter nothing.
    pub fn unknown_components(&self) -> Vec<&str> {
        let mut unknown: Vec<&str> = self
            .component_levels
            .iter()
            .flat_map(|levels| levels.keys())
            .map(String::as_str)
            .filter(|name| !COMPONENTS.contains(name))
            .collect();
        unknown.sort_unstable();
        unknown
    }
}
