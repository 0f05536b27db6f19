use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::cooldown::CooldownState;
use super::failure::FailureKind;
use crate::ratelimit::BucketPair;

/// Mask a credential for logs and display, e.g. `AIzaSy...abc123`.
///
/// ```
/// use keypool::registry::mask_key;
///
/// assert_eq!(mask_key("AIzaSyA1234567890abc123"), "AIzaSy...abc123");
/// assert_eq!(mask_key("short"), "***");
/// ```
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let keep = match chars.len() {
        n if n > 12 => 6,
        n if n > 8 => 3,
        _ => return "***".to_string(),
    };
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Observed credential status.
///
/// Only `Active` and `Quarantined` are stored; `Cooling` and `Retired` are
/// derived from bucket levels and any 429 cooldown when the credential is
/// observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    /// Eligible and holding tokens
    Active,
    /// Every bucket is momentarily exhausted, or benched after a 429
    Cooling,
    /// Every daily window is exhausted
    Retired,
    /// Removed from rotation after repeated failures
    Quarantined,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Cooling => "cooling",
            CredentialStatus::Retired => "retired",
            CredentialStatus::Quarantined => "quarantined",
        }
    }
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(CredentialStatus::Active),
            "cooling" => Ok(CredentialStatus::Cooling),
            "retired" => Ok(CredentialStatus::Retired),
            "quarantined" => Ok(CredentialStatus::Quarantined),
            _ => Err(format!("Invalid credential status: {}", s)),
        }
    }
}

/// Persistent part of the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoredStatus {
    #[default]
    Active,
    Quarantined,
}

/// Mutable state of one credential, guarded by the credential's own lock.
#[derive(Debug, Clone, Default)]
pub struct CredentialState {
    pub status: StoredStatus,
    pub consecutive_failures: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_kind: Option<FailureKind>,
    pub quarantined_at: Option<DateTime<Utc>>,
    pub cooldown: CooldownState,
    /// Per-model buckets, created lazily on first request
    pub buckets: HashMap<String, BucketPair>,
}

/// Derived status plus, for `Cooling`/`Retired`, the wait until a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub status: CredentialStatus,
    pub retry_after: Option<Duration>,
}

impl CredentialState {
    /// Derive the observable status at `now` without mutating buckets.
    ///
    /// A credential that has never been used and is not cooling down after
    /// a 429 is `Active`. Retired wins over a 429 cooldown.
    pub fn observe(&self, now: DateTime<Utc>) -> Observation {
        if self.status == StoredStatus::Quarantined {
            return Observation {
                status: CredentialStatus::Quarantined,
                retry_after: None,
            };
        }

        let used = !self.buckets.is_empty();
        let bucket_wait = self
            .buckets
            .values()
            .map(|pair| pair.next_grant_in(now))
            .min();

        if used && self.buckets.values().all(|pair| pair.long_exhausted_at(now)) {
            return Observation {
                status: CredentialStatus::Retired,
                retry_after: bucket_wait,
            };
        }

        let drained = used && self.buckets.values().all(|pair| !pair.can_grant_at(now));
        let retry_after = match (self.cooldown.remaining(now), drained) {
            (Some(cooldown), true) => bucket_wait.map(|wait| wait.max(cooldown)),
            (Some(cooldown), false) => Some(cooldown),
            (None, true) => bucket_wait,
            (None, false) => {
                return Observation {
                    status: CredentialStatus::Active,
                    retry_after: None,
                }
            }
        };
        Observation {
            status: CredentialStatus::Cooling,
            retry_after,
        }
    }

    /// Clear failures and reinstate. Returns whether it was quarantined.
    pub fn reinstate(&mut self) -> bool {
        let was_quarantined = self.status == StoredStatus::Quarantined;
        self.status = StoredStatus::Active;
        self.consecutive_failures = 0;
        self.quarantined_at = None;
        was_quarantined
    }
}

/// A credential record. The id is immutable; everything else sits behind
/// the per-credential mutex.
#[derive(Debug)]
pub struct Credential {
    id: String,
    masked: String,
    created_at: DateTime<Utc>,
    state: Mutex<CredentialState>,
}

impl Credential {
    pub fn new(id: String, created_at: DateTime<Utc>) -> Self {
        let masked = mask_key(&id);
        Self {
            id,
            masked,
            created_at,
            state: Mutex::new(CredentialState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display-safe form of the id.
    pub fn masked(&self) -> &str {
        &self.masked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Run `f` with the state locked. Keep `f` short and never await in it.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut CredentialState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    pub fn is_quarantined(&self) -> bool {
        self.state.lock().status == StoredStatus::Quarantined
    }

    pub fn observe(&self, now: DateTime<Utc>) -> Observation {
        self.state.lock().observe(now)
    }

    /// Snapshot for status APIs and the CLI.
    pub fn view(&self, now: DateTime<Utc>) -> CredentialView {
        let state = self.state.lock();
        let observation = state.observe(now);
        let buckets = state
            .buckets
            .iter()
            .map(|(model, pair)| {
                (
                    model.clone(),
                    BucketLevel {
                        rpm_capacity: pair.short.capacity(),
                        rpm_tokens: pair.short.projected(now),
                        rpd_capacity: pair.long.capacity(),
                        rpd_tokens: pair.long.projected(now),
                    },
                )
            })
            .collect();

        CredentialView {
            masked_key: self.masked.clone(),
            status: observation.status,
            retry_after_seconds: observation.retry_after.map(|d| d.as_secs_f64()),
            consecutive_failures: state.consecutive_failures,
            last_failure_kind: state.last_failure_kind.clone(),
            last_used_at: state.last_used_at,
            last_failure_at: state.last_failure_at,
            quarantined_at: state.quarantined_at,
            cooldown_level: state.cooldown.level,
            cooldown_until: state.cooldown.remaining(now).and(state.cooldown.until),
            created_at: self.created_at,
            buckets,
        }
    }
}

/// Token levels of one model's bucket pair at observation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketLevel {
    pub rpm_capacity: f64,
    pub rpm_tokens: f64,
    pub rpd_capacity: f64,
    pub rpd_tokens: f64,
}

/// Read-only view of a credential. Never carries the raw id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialView {
    pub masked_key: String,
    pub status: CredentialStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<f64>,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_kind: Option<FailureKind>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub quarantined_at: Option<DateTime<Utc>>,
    /// Ladder step the next 429 will apply
    pub cooldown_level: usize,
    /// End of the current 429 cooldown, if one is running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub buckets: BTreeMap<String, BucketLevel>,
}
