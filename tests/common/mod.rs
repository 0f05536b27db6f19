//! Shared test utilities for keypool integration tests.
//!
//! Provides pool builders on a manual clock and configurable probers.

#![allow(dead_code)]

use keypool::clock::ManualClock;
use keypool::config::{FailureConfig, KeyPoolConfig, LimitsConfig, RateLimit};
use keypool::health::{ProbeOutcome, Prober};
use keypool::pool::KeyPool;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// Credential Builders
// =============================================================================

/// Realistic-looking credential ids, long enough to be masked 6...6.
pub fn make_keys(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("AIzaSyTest-credential-{:04}", i))
        .collect()
}

// =============================================================================
// Pool Builders
// =============================================================================

pub fn make_config(keys: &[String], rpm: u32, rpd: u32) -> KeyPoolConfig {
    KeyPoolConfig {
        credentials: keys.to_vec(),
        limits: LimitsConfig {
            default: RateLimit::new(rpm, rpd),
            ..Default::default()
        },
        failure: FailureConfig {
            max_failures: 3,
            max_retries: 3,
        },
        ..Default::default()
    }
}

/// Pool on a manual clock. Returns the clock so tests can advance time.
pub fn make_pool(keys: &[String], rpm: u32, rpd: u32) -> (KeyPool, ManualClock) {
    make_pool_from(&make_config(keys, rpm, rpd))
}

pub fn make_pool_from(config: &KeyPoolConfig) -> (KeyPool, ManualClock) {
    let clock = ManualClock::default();
    let pool = KeyPool::with_clock(config, Arc::new(clock.clone())).unwrap();
    (pool, clock)
}

// =============================================================================
// Probers
// =============================================================================

/// Healthy for a fixed set of ids, unhealthy otherwise. Counts probes and
/// remembers the models they used.
pub struct StaticProber {
    healthy: HashSet<String>,
    calls: AtomicUsize,
    models: Mutex<Vec<String>>,
}

impl StaticProber {
    pub fn new<I, S>(healthy: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            healthy: healthy.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().clone()
    }
}

#[async_trait::async_trait]
impl Prober for StaticProber {
    async fn probe(&self, credential_id: &str, model: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().push(model.to_string());
        if self.healthy.contains(credential_id) {
            ProbeOutcome::Healthy
        } else {
            ProbeOutcome::Unhealthy {
                reason: "HTTP 401".to_string(),
            }
        }
    }
}
