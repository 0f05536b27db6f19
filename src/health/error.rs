//! Error types for credential probes.

use thiserror::Error;

/// Why a probe did not report healthy. Never fatal: every variant leaves
/// the credential quarantined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Probe did not finish in time
    #[error("probe timeout after {0}s")]
    Timeout(u64),

    /// Prober reported the credential unhealthy
    #[error("probe failed: {0}")]
    Failed(String),

    /// Probe task panicked or was cancelled
    #[error("probe aborted: {0}")]
    Aborted(String),
}

impl ProbeError {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Failed(_) => "unhealthy",
            ProbeError::Aborted(_) => "aborted",
        }
    }
}
