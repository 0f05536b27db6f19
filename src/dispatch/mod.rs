//! Credential dispatch
//!
//! Walks the rotation from a shared round-robin cursor and returns the first
//! credential whose buckets grant a token for the requested model. Outcomes
//! reported by the caller feed the failure tracker and usage counters.

pub mod error;
pub mod session;

pub use error::DispatchError;
pub use session::DispatchSession;

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::ratelimit::{Decision, Denial};
use crate::registry::{FailureKind, FailureTransition, Registry, RegistryError};
use crate::usage::UsageAggregator;

/// A credential granted for one upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub credential_id: String,
    pub model: String,
    /// Candidates examined before the grant, including the granted one
    pub examined: usize,
}

/// Outcome of examining one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttemptOutcome {
    Granted,
    RateLimited(Denial),
    /// Quarantined at the time of the attempt
    Unavailable,
}

/// One candidate examined during selection. Only logged.
#[derive(Debug, Clone)]
pub struct DispatchAttempt<'a> {
    pub credential: &'a str,
    pub model: &'a str,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Granted => f.write_str("granted"),
            AttemptOutcome::RateLimited(denial) => write!(
                f,
                "rate_limited({}, retry in {:.1}s)",
                denial.as_str(),
                denial.retry_after().as_secs_f64()
            ),
            AttemptOutcome::Unavailable => f.write_str("unavailable"),
        }
    }
}

impl DispatchAttempt<'_> {
    fn log(&self) {
        tracing::trace!(
            credential = %self.credential,
            model = %self.model,
            outcome = %self.outcome,
            "Dispatch attempt"
        );
    }
}

/// Dispatcher selects a credential for each request
pub struct Dispatcher {
    /// Reference to the credential registry
    registry: Arc<Registry>,

    /// Outcome counters
    usage: Arc<UsageAggregator>,

    clock: SharedClock,

    /// Shared rotation cursor; survives membership changes
    round_robin_counter: AtomicU64,

    /// Retries a session may make after its first attempt
    max_retries: u32,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        usage: Arc<UsageAggregator>,
        clock: SharedClock,
        max_retries: u32,
    ) -> Self {
        Self {
            registry,
            usage,
            clock,
            round_robin_counter: AtomicU64::new(0),
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Select a credential with capacity for `model`.
    ///
    /// Consumes at most one token. Never blocks on I/O.
    pub fn select_credential(&self, model: &str) -> Result<Selection, DispatchError> {
        self.select_excluding(model, &HashSet::new())
    }

    /// Like [`select_credential`](Self::select_credential), skipping ids in
    /// `excluded` without examining them.
    pub fn select_excluding(
        &self,
        model: &str,
        excluded: &HashSet<String>,
    ) -> Result<Selection, DispatchError> {
        let candidates = self.registry.rotation();
        let now = self.clock.now();

        let mut examined = 0;
        let mut retry_after = None;

        if !candidates.is_empty() {
            let counter = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
            let start = (counter as usize) % candidates.len();

            for offset in 0..candidates.len() {
                let credential = &candidates[(start + offset) % candidates.len()];
                if excluded.contains(credential.id()) {
                    continue;
                }
                examined += 1;

                let outcome = match self.registry.try_acquire(credential, model, now) {
                    None => AttemptOutcome::Unavailable,
                    Some(Decision::Granted) => AttemptOutcome::Granted,
                    Some(Decision::Denied(denial)) => AttemptOutcome::RateLimited(denial),
                };
                DispatchAttempt {
                    credential: credential.masked(),
                    model,
                    outcome,
                }
                .log();

                match outcome {
                    AttemptOutcome::Granted => {
                        // next call starts just past the granted credential
                        self.round_robin_counter
                            .fetch_max(counter + offset as u64 + 1, Ordering::Relaxed);
                        metrics::counter!("keypool_dispatch_total",
                            "model" => model.to_string(),
                            "outcome" => "granted"
                        )
                        .increment(1);
                        tracing::debug!(
                            credential = %credential.masked(),
                            model,
                            examined,
                            "Credential selected"
                        );
                        return Ok(Selection {
                            credential_id: credential.id().to_string(),
                            model: model.to_string(),
                            examined,
                        });
                    }
                    AttemptOutcome::RateLimited(denial) => {
                        let wait = denial.retry_after();
                        retry_after = Some(match retry_after {
                            Some(shortest) if shortest < wait => shortest,
                            _ => wait,
                        });
                    }
                    AttemptOutcome::Unavailable => {}
                }
            }
        }

        metrics::counter!("keypool_dispatch_total",
            "model" => model.to_string(),
            "outcome" => "unavailable"
        )
        .increment(1);
        tracing::warn!(model, examined, "No available credential");

        Err(DispatchError::NoAvailableCredential {
            model: model.to_string(),
            examined,
            retry_after,
        })
    }

    /// Report a successful upstream call.
    pub fn record_success(&self, credential_id: &str) -> Result<(), RegistryError> {
        self.registry.record_success(credential_id)?;
        self.usage
            .record_outcome(credential_id, true, self.clock.now());
        metrics::counter!("keypool_outcomes_total", "result" => "success").increment(1);
        Ok(())
    }

    /// Report a failed upstream call.
    pub fn record_failure(
        &self,
        credential_id: &str,
        kind: FailureKind,
    ) -> Result<FailureTransition, RegistryError> {
        let now = self.clock.now();
        let transition = self.registry.record_failure(credential_id, kind, now)?;
        self.usage.record_outcome(credential_id, false, now);

        metrics::counter!("keypool_outcomes_total", "result" => "failure").increment(1);
        if matches!(transition, FailureTransition::Quarantined { .. }) {
            metrics::counter!("keypool_quarantine_total").increment(1);
        }
        Ok(transition)
    }

    /// Start a bounded retry session for one logical request.
    pub fn session(&self, model: &str) -> DispatchSession<'_> {
        DispatchSession::new(self, model, self.max_retries)
    }
}
