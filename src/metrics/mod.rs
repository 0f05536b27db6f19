//! # Metrics Collection Module
//!
//! Prometheus export for the key pool.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `keypool_dispatch_total{model, outcome}` - Selection attempts
//! - `keypool_outcomes_total{result}` - Reported call outcomes
//! - `keypool_quarantine_total` - Credentials moved to quarantine
//! - `keypool_probe_total{result}` - Health probes run
//!
//! **Gauges:**
//! - `keypool_credentials{status}` - Credentials per derived status
//! - `keypool_uptime_seconds` - Seconds since the collector was created

// Re-export PrometheusBuilder for test compatibility
pub use metrics_exporter_prometheus::PrometheusBuilder;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::registry::{CredentialStatus, Registry};

/// Central coordinator for gauge computation and rendering.
pub struct MetricsCollector {
    /// Reference to credential registry for computing gauges
    registry: Arc<Registry>,
    clock: SharedClock,
    start_time: DateTime<Utc>,
    /// Prometheus handle for rendering metrics
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsCollector {
    pub fn new(
        registry: Arc<Registry>,
        clock: SharedClock,
        prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        let start_time = clock.now();
        Self {
            registry,
            clock,
            start_time,
            prometheus_handle,
        }
    }

    /// Update pool state gauges from the registry.
    ///
    /// Statuses are derived at the collector's current time, so Cooling and
    /// Retired reflect bucket refill since the last dispatch.
    pub fn update_pool_gauges(&self) {
        let counts = self.registry.status_counts(self.clock.now());
        for (status, count) in [
            (CredentialStatus::Active, counts.active),
            (CredentialStatus::Cooling, counts.cooling),
            (CredentialStatus::Retired, counts.retired),
            (CredentialStatus::Quarantined, counts.quarantined),
        ] {
            metrics::gauge!("keypool_credentials", "status" => status.as_str()).set(count as f64);
        }
        metrics::gauge!("keypool_uptime_seconds").set(self.uptime_seconds() as f64);
    }

    /// Seconds since the collector was created.
    pub fn uptime_seconds(&self) -> u64 {
        (self.clock.now() - self.start_time).num_seconds().max(0) as u64
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Refresh gauges and render Prometheus metrics in text format.
    pub fn render_metrics(&self) -> String {
        self.update_pool_gauges();
        self.prometheus_handle.render()
    }
}

/// Initialize the global Prometheus recorder.
///
/// Returns a PrometheusHandle that can be used to render metrics.
pub fn setup_metrics(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}
