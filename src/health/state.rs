//! Probe outcomes and per-credential probe history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::error::ProbeError;

/// Answer from a [`Prober`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy { reason: String },
}

/// Checks whether a credential works upstream by sending a minimal request
/// for `model`, the configured `health_check.test_model`.
///
/// Implementations must not assume they run under any lock; they may take
/// as long as they like, the scheduler bounds them with a timeout.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, credential_id: &str, model: &str) -> ProbeOutcome;
}

/// Result of probing one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub credential_id: String,
    pub result: Result<(), ProbeError>,
    /// Whether this probe moved the credential back to Active
    pub promoted: bool,
}

/// Outcome of a bulk verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub successful: Vec<String>,
    /// Failure reason per credential id
    pub failed: std::collections::BTreeMap<String, String>,
}

impl VerifyReport {
    pub fn valid_count(&self) -> usize {
        self.successful.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.failed.len()
    }
}

/// Probe history for one credential.
#[derive(Debug, Clone, Default)]
pub struct ProbeState {
    /// Probes that did not come back healthy since the last healthy one
    pub consecutive_failed_probes: u32,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_error: Option<ProbeError>,
}

impl ProbeState {
    /// Fold a probe result into the history.
    pub fn apply_result(&mut self, result: &Result<(), ProbeError>, at: DateTime<Utc>) {
        self.last_probe_at = Some(at);
        match result {
            Ok(()) => {
                self.consecutive_failed_probes = 0;
                self.last_error = None;
            }
            Err(e) => {
                self.consecutive_failed_probes += 1;
                self.last_error = Some(e.clone());
            }
        }
    }
}

/// Probe history keyed by credential id.
///
/// One instance lives per pool so manual verification and the background
/// scheduler see the same history.
#[derive(Debug, Default)]
pub struct ProbeHistory {
    states: DashMap<String, ProbeState>,
}

impl ProbeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, credential_id: &str) -> Option<ProbeState> {
        self.states.get(credential_id).map(|s| s.clone())
    }

    pub fn record(&self, credential_id: &str, result: &Result<(), ProbeError>, at: DateTime<Utc>) {
        self.states
            .entry(credential_id.to_string())
            .or_default()
            .apply_result(result, at);
    }

    pub fn forget(&self, credential_id: &str) {
        self.states.remove(credential_id);
    }

    /// Drop entries whose id fails `keep`.
    pub fn retain<F>(&self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        self.states.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
