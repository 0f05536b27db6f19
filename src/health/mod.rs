//! Health checking for quarantined credentials.
//!
//! A background task probes every quarantined credential at a fixed interval
//! and reinstates those that pass. Active credentials are never probed.
//! Each probe runs in its own task with a timeout; a panic or timeout counts
//! as unhealthy and no registry lock is held while a probe is in flight.
//! Cancelling the scheduler aborts any sweep in progress.

mod config;
mod error;
mod state;


pub use config::*;
pub use error::*;
pub use state::*;

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::SharedClock;
use crate::registry::{mask_key, Registry, RegistryError};

/// Aborts a spawned probe when dropped, so a cancelled sweep leaves no
/// probe running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Background service that periodically probes quarantined credentials.
pub struct HealthScheduler {
    /// Reference to the credential registry
    registry: Arc<Registry>,
    prober: Arc<dyn Prober>,
    config: HealthCheckConfig,
    clock: SharedClock,
    history: Arc<ProbeHistory>,
}

impl HealthScheduler {
    pub fn new(
        registry: Arc<Registry>,
        prober: Arc<dyn Prober>,
        config: HealthCheckConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            registry,
            prober,
            config,
            clock,
            history: Arc::new(ProbeHistory::new()),
        }
    }

    /// Record probe results into `history` instead of a private one.
    pub fn with_history(mut self, history: Arc<ProbeHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<ProbeHistory> {
        &self.history
    }

    /// Probe history of one credential.
    pub fn probe_state(&self, credential_id: &str) -> Option<ProbeState> {
        self.history.get(credential_id)
    }

    /// Run one probe against the test model in its own task, bounded by the
    /// configured timeout.
    async fn run_probe(&self, credential_id: &str) -> Result<(), ProbeError> {
        let prober = Arc::clone(&self.prober);
        let id = credential_id.to_string();
        let model = self.config.test_model.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move { prober.probe(&id, &model).await }));

        let result = match tokio::time::timeout(self.config.probe_timeout(), &mut task.0).await {
            Err(_) => Err(ProbeError::Timeout(self.config.probe_timeout_seconds)),
            Ok(Err(join_error)) => Err(ProbeError::Aborted(join_error.to_string())),
            Ok(Ok(ProbeOutcome::Healthy)) => Ok(()),
            Ok(Ok(ProbeOutcome::Unhealthy { reason })) => Err(ProbeError::Failed(reason)),
        };

        let label = match &result {
            Ok(()) => "healthy",
            Err(e) => e.as_str(),
        };
        metrics::counter!("keypool_probe_total", "result" => label).increment(1);
        result
    }

    /// Probe one quarantined credential and apply the result.
    pub async fn check_credential(&self, credential_id: String) -> ProbeReport {
        let result = self.run_probe(&credential_id).await;
        self.history.record(&credential_id, &result, self.clock.now());

        let promoted = match &result {
            Ok(()) => match self.registry.promote(&credential_id) {
                Ok(promoted) => promoted,
                Err(RegistryError::CredentialNotFound(_)) => {
                    tracing::debug!(
                        credential = %mask_key(&credential_id),
                        "Credential deleted during probe"
                    );
                    self.history.forget(&credential_id);
                    false
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to apply probe result");
                    false
                }
            },
            Err(e) => {
                tracing::info!(
                    credential = %mask_key(&credential_id),
                    error = %e,
                    "Credential still unhealthy"
                );
                false
            }
        };

        ProbeReport {
            credential_id,
            result,
            promoted,
        }
    }

    /// Probe every quarantined credential once.
    pub async fn check_quarantined(&self) -> Vec<ProbeReport> {
        let quarantined = self.registry.quarantined_ids();
        if quarantined.is_empty() {
            return Vec::new();
        }

        tracing::debug!(count = quarantined.len(), "Probing quarantined credentials");
        let reports: Vec<ProbeReport> = stream::iter(quarantined)
            .map(|id| self.check_credential(id))
            .buffer_unordered(self.config.max_concurrent_probes.max(1))
            .collect()
            .await;

        // forget history of credentials that have since been deleted
        self.history.retain(|id| self.registry.contains(id));
        reports
    }

    /// Manually verify one credential; success reinstates it and clears
    /// its failure counter.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::CredentialNotFound` for an unknown id.
    pub async fn verify(&self, credential_id: &str) -> Result<Result<(), ProbeError>, RegistryError> {
        self.registry.get(credential_id)?;
        let result = self.run_probe(credential_id).await;
        self.history.record(credential_id, &result, self.clock.now());

        if result.is_ok() && !self.registry.promote(credential_id)? {
            self.registry.record_success(credential_id)?;
        }
        tracing::info!(
            credential = %mask_key(credential_id),
            healthy = result.is_ok(),
            "Credential verified"
        );
        Ok(result)
    }

    /// Verify many credentials with bounded concurrency.
    ///
    /// Unknown ids are reported as failed.
    pub async fn verify_many(&self, credential_ids: Vec<String>) -> VerifyReport {
        let results: Vec<(String, Result<Result<(), ProbeError>, RegistryError>)> =
            stream::iter(credential_ids)
                .map(|id| async move {
                    let result = self.verify(&id).await;
                    (id, result)
                })
                .buffer_unordered(self.config.max_concurrent_probes.max(1))
                .collect()
                .await;

        let mut report = VerifyReport::default();
        for (id, result) in results {
            match result {
                Ok(Ok(())) => report.successful.push(id),
                Ok(Err(e)) => {
                    report.failed.insert(id, e.to_string());
                }
                Err(e) => {
                    report.failed.insert(id, e.to_string());
                }
            }
        }
        report.successful.sort();
        report
    }

    /// Start the scheduler background task.
    ///
    /// The first cycle runs one interval after start. Returns a JoinHandle
    /// that resolves when the token is cancelled, including mid-sweep; probes
    /// still in flight are aborted and their credentials stay quarantined.
    pub fn start(self: Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.interval().max(Duration::from_secs(1));
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                interval_hours = self.config.check_interval_hours,
                "Health scheduler started"
            );

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Health scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = cancel_token.cancelled() => {
                                tracing::info!("Health scheduler shutting down mid-cycle");
                                break;
                            }
                            reports = self.check_quarantined() => {
                                let promoted = reports.iter().filter(|r| r.promoted).count();
                                tracing::debug!(
                                    probed = reports.len(),
                                    promoted,
                                    "Health check cycle completed"
                                );
                            }
                        }
                    }
                }
            }
        })
    }
}
