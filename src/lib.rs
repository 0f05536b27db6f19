//! keypool - Credential pool and dispatch engine for rate-limited LLM API keys
//!
//! Fronts a pool of upstream credentials and hands out one per request so
//! that aggregate throughput approaches the sum of every credential's quota
//! without exceeding any single one. Credentials that keep failing are
//! quarantined and probed in the background until they recover.
//!
//! The [`pool::KeyPool`] facade is the entry point; the modules below it
//! can also be used on their own.

pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod ratelimit;
pub mod registry;
pub mod usage;
