//! Continuous-refill token buckets.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Length of the short (per-minute) window in seconds.
pub const SHORT_WINDOW_SECS: f64 = 60.0;
/// Length of the long (per-day) window in seconds.
pub const LONG_WINDOW_SECS: f64 = 86_400.0;

/// A single token bucket refilled continuously at `capacity / window` tokens
/// per second.
///
/// `0 <= tokens <= capacity` holds after every update, and `last_refill`
/// never moves backwards.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    window_secs: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    /// A bucket starting at full capacity.
    pub fn full(capacity: u32, window_secs: f64, now: DateTime<Utc>) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            tokens: capacity,
            window_secs,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Token level as of the last update.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> DateTime<Utc> {
        self.last_refill
    }

    /// Token level the bucket would have at `now`, without mutating it.
    pub fn projected(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.last_refill)
            .to_std()
            .unwrap_or_default()
            .as_secs_f64();
        (self.tokens + elapsed * self.capacity / self.window_secs).clamp(0.0, self.capacity)
    }

    /// Advance the bucket to `now`. An earlier `now` is a no-op.
    pub fn refill(&mut self, now: DateTime<Utc>) {
        if now <= self.last_refill {
            return;
        }
        self.tokens = self.projected(now);
        self.last_refill = now;
    }

    /// Whether at least one whole token is available.
    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Time until one whole token accrues, from the current level.
    pub fn retry_after(&self) -> Duration {
        Self::wait_for(self.tokens, self.capacity, self.window_secs)
    }

    /// Time until one whole token accrues, projected from `now`.
    pub fn retry_after_at(&self, now: DateTime<Utc>) -> Duration {
        Self::wait_for(self.projected(now), self.capacity, self.window_secs)
    }

    fn wait_for(tokens: f64, capacity: f64, window_secs: f64) -> Duration {
        if tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - tokens) * window_secs / capacity)
    }

    fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).clamp(0.0, self.capacity);
    }

    /// Restore to full capacity.
    pub fn fill(&mut self, now: DateTime<Utc>) {
        self.tokens = self.capacity;
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

/// Why a consume attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Denial {
    /// Short window exhausted; a token returns within the minute.
    Cooling { retry_after: Duration },
    /// Long window exhausted.
    Retired { retry_after: Duration },
    /// Benched after an upstream 429, regardless of bucket levels.
    Cooldown { retry_after: Duration },
}

impl Denial {
    pub fn retry_after(&self) -> Duration {
        match self {
            Denial::Cooling { retry_after }
            | Denial::Retired { retry_after }
            | Denial::Cooldown { retry_after } => *retry_after,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::Cooling { .. } => "cooling",
            Denial::Retired { .. } => "retired",
            Denial::Cooldown { .. } => "cooldown",
        }
    }
}

/// Outcome of [`BucketPair::try_consume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Granted,
    Denied(Denial),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }
}

/// Short and long window buckets for one credential/model pair.
#[derive(Debug, Clone)]
pub struct BucketPair {
    pub short: TokenBucket,
    pub long: TokenBucket,
}

impl BucketPair {
    pub fn full(rpm: u32, rpd: u32, now: DateTime<Utc>) -> Self {
        Self {
            short: TokenBucket::full(rpm, SHORT_WINDOW_SECS, now),
            long: TokenBucket::full(rpd, LONG_WINDOW_SECS, now),
        }
    }

    /// Refill both windows to `now` and take one token from each, or neither.
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> Decision {
        self.short.refill(now);
        self.long.refill(now);

        if !self.long.has_token() {
            return Decision::Denied(Denial::Retired {
                retry_after: self.long.retry_after(),
            });
        }
        if !self.short.has_token() {
            return Decision::Denied(Denial::Cooling {
                retry_after: self.short.retry_after(),
            });
        }

        self.short.take();
        self.long.take();
        Decision::Granted
    }

    /// Whether a consume at `now` would be granted.
    pub fn can_grant_at(&self, now: DateTime<Utc>) -> bool {
        self.short.projected(now) >= 1.0 && self.long.projected(now) >= 1.0
    }

    /// Whether the long window is empty at `now`.
    pub fn long_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        self.long.projected(now) < 1.0
    }

    /// Time until both windows hold a whole token.
    pub fn next_grant_in(&self, now: DateTime<Utc>) -> Duration {
        self.short
            .retry_after_at(now)
            .max(self.long.retry_after_at(now))
    }

    pub fn fill(&mut self, now: DateTime<Utc>) {
        self.short.fill(now);
        self.long.fill(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::full(5, SHORT_WINDOW_SECS, t0());
        assert_eq!(bucket.tokens(), 5.0);
        assert!(bucket.has_token());
        assert_eq!(bucket.retry_after(), Duration::ZERO);
    }

    #[test]
    fn test_bucket_refill_is_continuous() {
        let mut bucket = TokenBucket::full(60, SHORT_WINDOW_SECS, t0());
        for _ in 0..60 {
            bucket.take();
        }
        assert_eq!(bucket.tokens(), 0.0);

        bucket.refill(t0() + ChronoDuration::milliseconds(500));
        assert!((bucket.tokens() - 0.5).abs() < 1e-9);
        assert!(!bucket.has_token());
    }

    #[test]
    fn test_bucket_refill_caps_at_capacity() {
        let mut bucket = TokenBucket::full(5, SHORT_WINDOW_SECS, t0());
        bucket.refill(t0() + ChronoDuration::hours(10));
        assert_eq!(bucket.tokens(), 5.0);
    }

    #[test]
    fn test_bucket_backward_clock_grants_nothing() {
        let mut bucket = TokenBucket::full(5, SHORT_WINDOW_SECS, t0());
        bucket.take();
        bucket.take();
        let later = t0() + ChronoDuration::seconds(1);
        bucket.refill(later);
        let level = bucket.tokens();

        bucket.refill(t0() - ChronoDuration::seconds(3600));
        assert_eq!(bucket.tokens(), level);
        assert_eq!(bucket.last_refill(), later);
    }

    #[test]
    fn test_retry_after_for_empty_short_window() {
        let mut pair = BucketPair::full(5, 100, t0());
        for _ in 0..5 {
            assert!(pair.try_consume(t0()).is_granted());
        }
        match pair.try_consume(t0()) {
            Decision::Denied(Denial::Cooling { retry_after }) => {
                assert_eq!(retry_after.as_secs(), 12);
            }
            other => panic!("expected cooling, got {:?}", other),
        }
    }

    #[test]
    fn test_long_window_exhaustion_is_retired() {
        let mut pair = BucketPair::full(10, 2, t0());
        assert!(pair.try_consume(t0()).is_granted());
        assert!(pair.try_consume(t0()).is_granted());

        let decision = pair.try_consume(t0());
        assert!(matches!(decision, Decision::Denied(Denial::Retired { .. })));
        // Whole day divided by two tokens
        assert_eq!(
            decision_retry(decision).as_secs(),
            (LONG_WINDOW_SECS / 2.0) as u64
        );
    }

    #[test]
    fn test_denied_consume_takes_nothing() {
        let mut pair = BucketPair::full(1, 100, t0());
        assert!(pair.try_consume(t0()).is_granted());
        let long_before = pair.long.tokens();

        assert!(!pair.try_consume(t0()).is_granted());
        assert_eq!(pair.long.tokens(), long_before);
    }

    #[test]
    fn test_fill_restores_capacity() {
        let mut pair = BucketPair::full(2, 3, t0());
        pair.try_consume(t0());
        pair.try_consume(t0());
        pair.fill(t0());
        assert_eq!(pair.short.tokens(), 2.0);
        assert_eq!(pair.long.tokens(), 3.0);
    }

    #[test]
    fn test_projection_does_not_mutate() {
        let mut pair = BucketPair::full(1, 100, t0());
        pair.try_consume(t0());
        assert!(!pair.can_grant_at(t0()));
        assert!(pair.can_grant_at(t0() + ChronoDuration::seconds(60)));
        assert_eq!(pair.short.tokens(), 0.0);
        assert_eq!(pair.next_grant_in(t0()).as_secs(), 60);
    }

    fn decision_retry(decision: Decision) -> Duration {
        match decision {
            Decision::Denied(denial) => denial.retry_after(),
            Decision::Granted => Duration::ZERO,
        }
    }
}
