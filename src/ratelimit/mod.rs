//! Dual-window rate limiting.
//!
//! Every (credential, model) pair owns a [`BucketPair`]: a short window
//! holding RPM tokens over 60 seconds and a long window holding RPD tokens
//! over a rolling day. A request is granted only when both windows hold a
//! whole token, and then takes one from each.

mod bucket;

pub use bucket::*;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ModelLimits;

/// Gatekeeper applying configured limits to per-credential bucket maps.
///
/// The limiter itself is stateless apart from the limit table; bucket state
/// lives with each credential so it is updated under that credential's lock.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limits: Arc<ModelLimits>,
}

impl RateLimiter {
    pub fn new(limits: Arc<ModelLimits>) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ModelLimits {
        &self.limits
    }

    /// Try to take one token for `model` from `buckets`.
    ///
    /// A bucket pair is created at full capacity the first time a model is
    /// requested on a credential.
    pub fn try_consume(
        &self,
        buckets: &mut HashMap<String, BucketPair>,
        credential_id: &str,
        model: &str,
        now: DateTime<Utc>,
    ) -> Decision {
        let pair = buckets.entry(model.to_string()).or_insert_with(|| {
            let limit = self.limits.resolve(credential_id, model);
            BucketPair::full(limit.rpm, limit.rpd, now)
        });
        pair.try_consume(now)
    }
}
