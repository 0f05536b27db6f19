//! The `KeyPool` facade.
//!
//! Wires the registry, dispatcher, usage aggregator and health scheduler
//! together from a [`KeyPoolConfig`] and exposes the operations a gateway
//! needs: selection, outcome reporting, admin actions and snapshots.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigError, KeyPoolConfig, ModelLimits};
use crate::dispatch::{DispatchError, DispatchSession, Dispatcher, Selection};
use crate::health::{
    HealthCheckConfig, HealthScheduler, ProbeError, ProbeHistory, ProbeState, Prober, VerifyReport,
};
use crate::ratelimit::RateLimiter;
use crate::registry::{
    CooldownPolicy, CredentialView, FailureKind, FailureTracker, FailureTransition, Registry, RegistryError,
    StatusCounts, StatusSnapshot,
};
use crate::usage::{UsageAggregator, UsageReport};

/// Credential pool and dispatch engine.
///
/// ```
/// use keypool::config::KeyPoolConfig;
/// use keypool::pool::KeyPool;
///
/// let config = KeyPoolConfig {
///     credentials: vec!["key-a".to_string()],
///     ..Default::default()
/// };
/// let pool = KeyPool::from_config(&config).unwrap();
///
/// let selection = pool.select_credential("gemini-pro").unwrap();
/// pool.record_success(&selection.credential_id).unwrap();
/// assert_eq!(pool.usage_snapshot().global.minute.total, 1);
/// ```
pub struct KeyPool {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    usage: Arc<UsageAggregator>,
    health_config: HealthCheckConfig,
    /// Shared by every scheduler built from this pool
    probe_history: Arc<ProbeHistory>,
    clock: SharedClock,
}

impl KeyPool {
    /// Build a pool on the system clock.
    pub fn from_config(config: &KeyPoolConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a pool reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Any configuration problem, including duplicate credentials.
    pub fn with_clock(config: &KeyPoolConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;

        let limits = Arc::new(ModelLimits::from_config(&config.limits)?);
        let registry = Arc::new(
            Registry::new(
                RateLimiter::new(limits),
                FailureTracker::new(config.failure.max_failures),
            )
            .with_cooldown(CooldownPolicy::new(config.cooldown.durations())),
        );

        let now = clock.now();
        for id in &config.credentials {
            registry.add_credential(id.clone(), now).map_err(|e| match e {
                RegistryError::DuplicateCredential(masked) => {
                    ConfigError::DuplicateCredential(masked)
                }
                other => ConfigError::Validation {
                    field: "credentials".to_string(),
                    message: other.to_string(),
                },
            })?;
        }

        let usage = Arc::new(UsageAggregator::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&usage),
            Arc::clone(&clock),
            config.failure.max_retries,
        );

        tracing::info!(
            credentials = registry.len(),
            max_failures = config.failure.max_failures,
            max_retries = config.failure.max_retries,
            cooldown_steps = config.cooldown.durations().len(),
            "Key pool initialized"
        );

        Ok(Self {
            registry,
            dispatcher,
            usage,
            health_config: config.health_check.clone(),
            probe_history: Arc::new(ProbeHistory::new()),
            clock,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub fn select_credential(&self, model: &str) -> Result<Selection, DispatchError> {
        self.dispatcher.select_credential(model)
    }

    /// Bounded retry session for one logical request.
    pub fn session(&self, model: &str) -> DispatchSession<'_> {
        self.dispatcher.session(model)
    }

    pub fn record_success(&self, credential_id: &str) -> Result<(), RegistryError> {
        self.dispatcher.record_success(credential_id)
    }

    pub fn record_failure(
        &self,
        credential_id: &str,
        kind: FailureKind,
    ) -> Result<FailureTransition, RegistryError> {
        self.dispatcher.record_failure(credential_id, kind)
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    pub fn add_credential(&self, credential_id: &str) -> Result<(), RegistryError> {
        self.registry
            .add_credential(credential_id.to_string(), self.clock.now())
    }

    /// Add credentials, skipping duplicates. Returns how many were added.
    pub fn import_credentials<I>(&self, credential_ids: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.registry
            .import_credentials(credential_ids, self.clock.now())
    }

    /// Clear failures, force Active and optionally refill every bucket.
    pub fn reset_credential(&self, credential_id: &str, refill: bool) -> Result<(), RegistryError> {
        self.registry.reset(credential_id, refill, self.clock.now())
    }

    pub fn reset_credentials(&self, credential_ids: &[String], refill: bool) -> usize {
        self.registry
            .reset_many(credential_ids, refill, self.clock.now())
    }

    /// Reinstate every quarantined credential. Returns how many were.
    pub fn reset_all_failures(&self) -> usize {
        self.registry.reset_all_failures()
    }

    /// Remove a credential from rotation, snapshots and per-credential usage.
    pub fn delete_credential(&self, credential_id: &str) -> Result<(), RegistryError> {
        self.registry.remove_credential(credential_id)?;
        self.usage.remove(credential_id);
        self.probe_history.forget(credential_id);
        Ok(())
    }

    pub fn delete_credentials(&self, credential_ids: &[String]) -> usize {
        let removed = self.registry.remove_many(credential_ids);
        for credential in &removed {
            self.usage.remove(credential.id());
            self.probe_history.forget(credential.id());
        }
        removed.len()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.registry.status_snapshot(self.clock.now())
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.registry.status_counts(self.clock.now())
    }

    pub fn credential_views(&self) -> Vec<CredentialView> {
        self.registry.views(self.clock.now())
    }

    pub fn credential_view(&self, credential_id: &str) -> Result<CredentialView, RegistryError> {
        self.registry.view(credential_id, self.clock.now())
    }

    pub fn usage_snapshot(&self) -> UsageReport {
        self.usage.snapshot(self.clock.now())
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Build a health scheduler bound to this pool's registry and probe
    /// history.
    pub fn health_scheduler(&self, prober: Arc<dyn Prober>) -> Arc<HealthScheduler> {
        Arc::new(
            HealthScheduler::new(
                Arc::clone(&self.registry),
                prober,
                self.health_config.clone(),
                Arc::clone(&self.clock),
            )
            .with_history(Arc::clone(&self.probe_history)),
        )
    }

    /// Probe history of one credential, from manual verification and the
    /// background scheduler alike.
    pub fn probe_state(&self, credential_id: &str) -> Option<ProbeState> {
        self.probe_history.get(credential_id)
    }

    /// Start the background scheduler, unless disabled in configuration.
    ///
    /// Join the returned handle after cancelling `cancel_token`.
    pub fn start_scheduler(
        &self,
        prober: Arc<dyn Prober>,
        cancel_token: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !self.health_config.enabled {
            tracing::info!("Health scheduler disabled");
            return None;
        }
        Some(self.health_scheduler(prober).start(cancel_token))
    }

    /// Probe one credential on admin request; success reinstates it.
    pub async fn verify(
        &self,
        prober: Arc<dyn Prober>,
        credential_id: &str,
    ) -> Result<Result<(), ProbeError>, RegistryError> {
        self.health_scheduler(prober).verify(credential_id).await
    }

    pub async fn verify_many(
        &self,
        prober: Arc<dyn Prober>,
        credential_ids: Vec<String>,
    ) -> VerifyReport {
        self.health_scheduler(prober)
            .verify_many(credential_ids)
            .await
    }
}
