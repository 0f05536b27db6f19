//! Consecutive-failure tracking and the quarantine trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::credential::{CredentialState, StoredStatus};

/// Category of an upstream failure, kept for observability only.
///
/// Every kind counts the same toward the quarantine threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureKind {
    /// Upstream answered 429
    RateLimited,
    /// Upstream rejected the credential (401/403)
    Unauthorized,
    /// Upstream 5xx
    ServerError,
    /// No answer within the caller's deadline
    Timeout,
    Other(String),
}

impl FailureKind {
    /// Classify an upstream HTTP status code.
    pub fn from_status(code: u16) -> Self {
        match code {
            429 => FailureKind::RateLimited,
            401 | 403 => FailureKind::Unauthorized,
            408 | 504 => FailureKind::Timeout,
            500..=599 => FailureKind::ServerError,
            other => FailureKind::Other(format!("HTTP {}", other)),
        }
    }

    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::ServerError => "server_error",
            FailureKind::Timeout => "timeout",
            FailureKind::Other(_) => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Other(detail) => write!(f, "other: {}", detail),
            kind => f.write_str(kind.as_str()),
        }
    }
}

/// Applies success/failure outcomes to a credential's state.
#[derive(Debug, Clone, Copy)]
pub struct FailureTracker {
    max_failures: u32,
}

/// Result of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTransition {
    /// Counter incremented, still below threshold
    Counted { failures: u32 },
    /// Threshold reached; the credential was quarantined by this failure
    Quarantined { failures: u32 },
    /// The credential was already quarantined
    AlreadyQuarantined { failures: u32 },
}

impl FailureTracker {
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures: max_failures.max(1),
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// Reset the consecutive-failure counter.
    pub fn record_success(&self, state: &mut CredentialState) {
        state.consecutive_failures = 0;
    }

    /// Count a failure and quarantine at the threshold, regardless of the
    /// credential's rate-limit state.
    pub fn record_failure(
        &self,
        state: &mut CredentialState,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> FailureTransition {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(now);
        state.last_failure_kind = Some(kind);
        let failures = state.consecutive_failures;

        match state.status {
            StoredStatus::Quarantined => FailureTransition::AlreadyQuarantined { failures },
            StoredStatus::Active if failures >= self.max_failures => {
                state.status = StoredStatus::Quarantined;
                state.quarantined_at = Some(now);
                FailureTransition::Quarantined { failures }
            }
            StoredStatus::Active => FailureTransition::Counted { failures },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_from_status() {
        assert_eq!(FailureKind::from_status(429), FailureKind::RateLimited);
        assert_eq!(FailureKind::from_status(401), FailureKind::Unauthorized);
        assert_eq!(FailureKind::from_status(403), FailureKind::Unauthorized);
        assert_eq!(FailureKind::from_status(503), FailureKind::ServerError);
        assert_eq!(FailureKind::from_status(408), FailureKind::Timeout);
        assert_eq!(
            FailureKind::from_status(400),
            FailureKind::Other("HTTP 400".to_string())
        );
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            FailureKind::Other("bad payload".to_string()).to_string(),
            "other: bad payload"
        );
    }

    #[test]
    fn test_failure_kind_serde() {
        let json = serde_json::to_string(&FailureKind::Timeout).unwrap();
        assert_eq!(json, r#"{"kind":"timeout"}"#);
        let json = serde_json::to_string(&FailureKind::Other("x".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"other","detail":"x"}"#);
    }

    #[test]
    fn test_quarantine_at_threshold() {
        let tracker = FailureTracker::new(3);
        let mut state = CredentialState::default();
        let now = Utc::now();

        assert_eq!(
            tracker.record_failure(&mut state, FailureKind::ServerError, now),
            FailureTransition::Counted { failures: 1 }
        );
        assert_eq!(
            tracker.record_failure(&mut state, FailureKind::ServerError, now),
            FailureTransition::Counted { failures: 2 }
        );
        assert_eq!(
            tracker.record_failure(&mut state, FailureKind::Timeout, now),
            FailureTransition::Quarantined { failures: 3 }
        );
        assert_eq!(state.status, StoredStatus::Quarantined);
        assert_eq!(state.quarantined_at, Some(now));
        assert_eq!(state.last_failure_kind, Some(FailureKind::Timeout));

        assert_eq!(
            tracker.record_failure(&mut state, FailureKind::Timeout, now),
            FailureTransition::AlreadyQuarantined { failures: 4 }
        );
    }

    #[test]
    fn test_success_resets_counter() {
        let tracker = FailureTracker::new(3);
        let mut state = CredentialState::default();
        let now = Utc::now();

        tracker.record_failure(&mut state, FailureKind::ServerError, now);
        tracker.record_failure(&mut state, FailureKind::ServerError, now);
        tracker.record_success(&mut state);
        tracker.record_failure(&mut state, FailureKind::ServerError, now);
        tracker.record_failure(&mut state, FailureKind::ServerError, now);

        assert_eq!(state.status, StoredStatus::Active);
        assert_eq!(state.consecutive_failures, 2);
    }

    #[test]
    fn test_zero_threshold_clamps_to_one() {
        let tracker = FailureTracker::new(0);
        assert_eq!(tracker.max_failures(), 1);
    }
}
