//! Escalating cooldown after upstream 429 responses.
//!
//! Independent of the rate buckets and of the quarantine counter: a 429
//! still counts as one failure, and additionally benches the credential for
//! the current step of the ladder.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Where a credential stands on the cooldown ladder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    /// Step the next 429 will apply
    pub level: usize,
    pub until: Option<DateTime<Utc>>,
}

impl CooldownState {
    /// Time left at `now`; `None` once the cooldown has run out.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until = self.until?;
        (until - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Forget the cooldown and drop back to the first step.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One cooldown applied by [`CooldownPolicy::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStep {
    pub level: usize,
    pub duration: Duration,
    pub next_level: usize,
}

/// Ladder of cooldown lengths shared by every credential. Empty means
/// disabled.
#[derive(Debug, Clone, Default)]
pub struct CooldownPolicy {
    steps: Vec<Duration>,
}

impl CooldownPolicy {
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }

    /// Bench the credential for its current step and move it one step up.
    /// After the last step the ladder starts over. The level is kept when
    /// the cooldown runs out, so the next 429 lands on the next step.
    pub fn apply(&self, state: &mut CooldownState, now: DateTime<Utc>) -> Option<CooldownStep> {
        if self.steps.is_empty() {
            return None;
        }
        let level = state.level % self.steps.len();
        let duration = self.steps[level];
        let next_level = (level + 1) % self.steps.len();

        state.until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
        state.level = next_level;

        Some(CooldownStep {
            level,
            duration,
            next_level,
        })
    }
}
