//! Credential Registry module.
//!
//! Owns every credential record, its stored status and its per-model rate
//! buckets. Credentials are indexed in a concurrent map for lookups and kept
//! in a read-mostly rotation list for the dispatcher. Each credential's
//! mutable state has its own lock; no operation takes a registry-wide lock
//! while touching credential state.

mod cooldown;
mod credential;
mod error;
mod failure;

pub use cooldown::*;
pub use credential::*;
pub use error::*;
pub use failure::*;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ratelimit::{Decision, Denial, RateLimiter};

/// Credentials grouped by observed status, each list in rotation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub active: Vec<String>,
    /// Cooling credentials with seconds until the next token
    pub cooling: BTreeMap<String, f64>,
    pub retired: Vec<String>,
    pub quarantined: Vec<String>,
}

impl StatusSnapshot {
    pub fn total(&self) -> usize {
        self.active.len() + self.cooling.len() + self.retired.len() + self.quarantined.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.iter().any(|c| c == id)
            || self.cooling.contains_key(id)
            || self.retired.iter().any(|c| c == id)
            || self.quarantined.iter().any(|c| c == id)
    }
}

/// Per-status counts, used for gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub active: usize,
    pub cooling: usize,
    pub retired: usize,
    pub quarantined: usize,
}

/// The Credential Registry stores all known credentials.
///
/// # Examples
///
/// ```
/// use keypool::config::{ModelLimits, RateLimit};
/// use keypool::ratelimit::RateLimiter;
/// use keypool::registry::{FailureTracker, Registry};
/// use std::sync::Arc;
///
/// let limiter = RateLimiter::new(Arc::new(ModelLimits::uniform(RateLimit::new(5, 100))));
/// let registry = Registry::new(limiter, FailureTracker::new(3));
///
/// registry.add_credential("key-1".to_string(), chrono::Utc::now()).unwrap();
/// assert_eq!(registry.len(), 1);
/// ```
pub struct Registry {
    credentials: DashMap<String, Arc<Credential>>,
    order: RwLock<Vec<Arc<Credential>>>,
    limiter: RateLimiter,
    tracker: FailureTracker,
    cooldown: CooldownPolicy,
}

impl Registry {
    /// A registry with the 429 cooldown disabled.
    pub fn new(limiter: RateLimiter, tracker: FailureTracker) -> Self {
        Self {
            credentials: DashMap::new(),
            order: RwLock::new(Vec::new()),
            limiter,
            tracker,
            cooldown: CooldownPolicy::disabled(),
        }
    }

    /// Bench credentials along `policy` whenever upstream answers 429.
    pub fn with_cooldown(mut self, policy: CooldownPolicy) -> Self {
        self.cooldown = policy;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    pub fn cooldown(&self) -> &CooldownPolicy {
        &self.cooldown
    }

    /// Add a credential at the end of the rotation.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateCredential` if the id is already
    /// registered, `RegistryError::EmptyCredential` for a blank id.
    pub fn add_credential(&self, id: String, now: DateTime<Utc>) -> Result<(), RegistryError> {
        if id.trim().is_empty() {
            return Err(RegistryError::EmptyCredential);
        }

        // Holding the order lock serializes concurrent adds of the same id
        let mut order = self.order.write();
        if self.credentials.contains_key(&id) {
            return Err(RegistryError::DuplicateCredential(mask_key(&id)));
        }

        let credential = Arc::new(Credential::new(id.clone(), now));
        tracing::info!(credential = %credential.masked(), "Credential added");
        self.credentials.insert(id, Arc::clone(&credential));
        order.push(credential);
        Ok(())
    }

    /// Add many credentials, skipping blanks and ids already present.
    ///
    /// Returns the number actually added.
    pub fn import_credentials<I>(&self, ids: I, now: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for id in ids {
            match self.add_credential(id, now) {
                Ok(()) => added += 1,
                Err(e) => tracing::debug!(error = %e, "Skipping credential on import"),
            }
        }
        added
    }

    /// Remove a credential from the index and the rotation.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::CredentialNotFound` if no credential has this id.
    pub fn remove_credential(&self, id: &str) -> Result<Arc<Credential>, RegistryError> {
        let mut order = self.order.write();
        let (_, credential) = self
            .credentials
            .remove(id)
            .ok_or_else(|| RegistryError::CredentialNotFound(mask_key(id)))?;
        order.retain(|c| c.id() != id);

        tracing::info!(credential = %credential.masked(), "Credential deleted");
        Ok(credential)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Credential>, RegistryError> {
        self.credentials
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::CredentialNotFound(mask_key(id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.credentials.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Snapshot of the rotation list. Cheap: clones `Arc`s only.
    pub fn rotation(&self) -> Vec<Arc<Credential>> {
        self.order.read().clone()
    }

    /// Ids in rotation order.
    pub fn ids(&self) -> Vec<String> {
        self.order
            .read()
            .iter()
            .map(|c| c.id().to_string())
            .collect()
    }

    /// Gate one request for `model` on `credential`.
    ///
    /// Returns `None` when the credential is quarantined. A credential in a
    /// 429 cooldown is denied without touching its buckets. Otherwise the
    /// rate limiter decides, under the credential lock.
    pub fn try_acquire(
        &self,
        credential: &Credential,
        model: &str,
        now: DateTime<Utc>,
    ) -> Option<Decision> {
        credential.with_state(|state| {
            if state.status == StoredStatus::Quarantined {
                return None;
            }
            if let Some(retry_after) = state.cooldown.remaining(now) {
                return Some(Decision::Denied(Denial::Cooldown { retry_after }));
            }
            let decision =
                self.limiter
                    .try_consume(&mut state.buckets, credential.id(), model, now);
            if decision.is_granted() {
                state.last_used_at = Some(now);
            }
            Some(decision)
        })
    }

    /// Reset the failure counter after a successful upstream call.
    pub fn record_success(&self, id: &str) -> Result<(), RegistryError> {
        let credential = self.get(id)?;
        credential.with_state(|state| self.tracker.record_success(state));
        Ok(())
    }

    /// Count a failure, quarantining at the threshold. A 429 also starts
    /// the next cooldown on the ladder; it counts toward quarantine like any
    /// other failure.
    pub fn record_failure(
        &self,
        id: &str,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) -> Result<FailureTransition, RegistryError> {
        let credential = self.get(id)?;
        let label = kind.to_string();
        let rate_limited = kind == FailureKind::RateLimited;
        let (transition, cooldown) = credential.with_state(|state| {
            let cooldown = if rate_limited {
                self.cooldown.apply(&mut state.cooldown, now)
            } else {
                None
            };
            (self.tracker.record_failure(state, kind, now), cooldown)
        });

        if let Some(step) = cooldown {
            metrics::counter!("keypool_cooldown_total").increment(1);
            tracing::info!(
                credential = %credential.masked(),
                cooldown_secs = step.duration.as_secs(),
                level = step.level,
                next_level = step.next_level,
                "Credential cooling down after 429"
            );
        }

        match transition {
            FailureTransition::Quarantined { failures } => {
                tracing::warn!(
                    credential = %credential.masked(),
                    failures,
                    kind = %label,
                    "Credential quarantined"
                );
            }
            FailureTransition::Counted { failures }
            | FailureTransition::AlreadyQuarantined { failures } => {
                tracing::debug!(
                    credential = %credential.masked(),
                    failures,
                    kind = %label,
                    "Credential failure recorded"
                );
            }
        }
        Ok(transition)
    }

    /// Ids of quarantined credentials, in rotation order.
    pub fn quarantined_ids(&self) -> Vec<String> {
        self.rotation()
            .iter()
            .filter(|c| c.is_quarantined())
            .map(|c| c.id().to_string())
            .collect()
    }

    /// Move a quarantined credential back to Active with failures cleared.
    ///
    /// Returns `false` if it was not quarantined (left untouched).
    pub fn promote(&self, id: &str) -> Result<bool, RegistryError> {
        let credential = self.get(id)?;
        let promoted = credential.with_state(|state| {
            if state.status == StoredStatus::Quarantined {
                state.reinstate()
            } else {
                false
            }
        });
        if promoted {
            tracing::info!(credential = %credential.masked(), "Credential reinstated");
        }
        Ok(promoted)
    }

    /// Manual reset: clear failures and any 429 cooldown, force Active,
    /// optionally refill buckets.
    pub fn reset(&self, id: &str, refill: bool, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let credential = self.get(id)?;
        credential.with_state(|state| {
            state.reinstate();
            state.cooldown.clear();
            if refill {
                for pair in state.buckets.values_mut() {
                    pair.fill(now);
                }
            }
        });
        tracing::info!(credential = %credential.masked(), refill, "Credential reset");
        Ok(())
    }

    /// Reset every id that exists. Returns how many were reset.
    pub fn reset_many(&self, ids: &[String], refill: bool, now: DateTime<Utc>) -> usize {
        ids.iter()
            .filter(|id| self.reset(id, refill, now).is_ok())
            .count()
    }

    /// Remove every id that exists. Returns the removed credentials.
    pub fn remove_many(&self, ids: &[String]) -> Vec<Arc<Credential>> {
        ids.iter()
            .filter_map(|id| self.remove_credential(id).ok())
            .collect()
    }

    /// Clear the failure counter on every credential and reinstate any that
    /// are quarantined. Returns how many were reinstated.
    pub fn reset_all_failures(&self) -> usize {
        let reinstated = self
            .rotation()
            .iter()
            .filter(|c| c.with_state(|state| state.reinstate()))
            .count();
        tracing::info!(reinstated, "All credential failure counts reset");
        reinstated
    }

    /// Group credentials by observed status at `now`.
    pub fn status_snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        for credential in self.rotation() {
            let observation = credential.observe(now);
            let id = credential.id().to_string();
            match observation.status {
                CredentialStatus::Active => snapshot.active.push(id),
                CredentialStatus::Cooling => {
                    let secs = observation
                        .retry_after
                        .map(|d| d.as_secs_f64())
                        .unwrap_or_default();
                    snapshot.cooling.insert(id, secs);
                }
                CredentialStatus::Retired => snapshot.retired.push(id),
                CredentialStatus::Quarantined => snapshot.quarantined.push(id),
            }
        }
        snapshot
    }

    pub fn status_counts(&self, now: DateTime<Utc>) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for credential in self.rotation() {
            match credential.observe(now).status {
                CredentialStatus::Active => counts.active += 1,
                CredentialStatus::Cooling => counts.cooling += 1,
                CredentialStatus::Retired => counts.retired += 1,
                CredentialStatus::Quarantined => counts.quarantined += 1,
            }
        }
        counts
    }

    /// Detail views in rotation order.
    pub fn views(&self, now: DateTime<Utc>) -> Vec<CredentialView> {
        self.rotation().iter().map(|c| c.view(now)).collect()
    }

    pub fn view(&self, id: &str, now: DateTime<Utc>) -> Result<CredentialView, RegistryError> {
        Ok(self.get(id)?.view(now))
    }
}
