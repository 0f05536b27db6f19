//! Usage statistics aggregation.
//!
//! Each credential owns a [`UsageCounter`] behind its own lock. The pool-wide
//! rollup is computed at query time by summing, so recording an outcome never
//! touches shared state beyond a map lookup.
//!
//! Windows: last minute and last hour (1 s slots, so both are exact trailing
//! windows to the second), last 24 hours (60 s slots) and the current UTC
//! calendar month.

mod window;

pub use window::*;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-window totals for one credential or the whole pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub minute: WindowStats,
    pub hour: WindowStats,
    pub day: WindowStats,
    pub month: WindowStats,
}

impl std::ops::Add for UsageSnapshot {
    type Output = UsageSnapshot;

    fn add(self, rhs: UsageSnapshot) -> UsageSnapshot {
        UsageSnapshot {
            minute: self.minute + rhs.minute,
            hour: self.hour + rhs.hour,
            day: self.day + rhs.day,
            month: self.month + rhs.month,
        }
    }
}

/// Pool-wide usage report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageReport {
    pub global: UsageSnapshot,
    /// Keyed by credential id
    pub credentials: BTreeMap<String, UsageSnapshot>,
}

/// Rolling counters for one credential.
///
/// The minute and hour windows count exactly the trailing 60 s and 3600 s.
/// The day window works in whole minutes: an event drops out between
/// 23h59m and 24h after it was recorded, depending on where it fell within
/// its minute.
#[derive(Debug, Clone)]
pub struct UsageCounter {
    minute: SlotRing,
    hour: SlotRing,
    day: SlotRing,
    month: MonthCounter,
}

impl Default for UsageCounter {
    fn default() -> Self {
        Self {
            minute: SlotRing::new(60, 1),
            hour: SlotRing::new(3600, 1),
            day: SlotRing::new(1440, 60),
            month: MonthCounter::default(),
        }
    }
}

impl UsageCounter {
    pub fn record(&mut self, succeeded: bool, at: DateTime<Utc>) {
        self.minute.record(succeeded, at);
        self.hour.record(succeeded, at);
        self.day.record(succeeded, at);
        self.month.record(succeeded, at);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> UsageSnapshot {
        UsageSnapshot {
            minute: self.minute.stats(now),
            hour: self.hour.stats(now),
            day: self.day.stats(now),
            month: self.month.stats(now),
        }
    }

    pub fn merge(&mut self, other: &UsageCounter) {
        self.minute.merge(&other.minute);
        self.hour.merge(&other.hour);
        self.day.merge(&other.day);
        self.month.merge(&other.month);
    }
}

/// Aggregates outcomes per credential.
#[derive(Default)]
pub struct UsageAggregator {
    counters: DashMap<String, Arc<Mutex<UsageCounter>>>,
    /// History of deleted credentials, kept for the global rollup
    removed: Mutex<UsageCounter>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one upstream outcome for `credential_id`.
    pub fn record_outcome(&self, credential_id: &str, succeeded: bool, at: DateTime<Utc>) {
        let entry = match self.counters.get(credential_id) {
            Some(entry) => Arc::clone(entry.value()),
            None => Arc::clone(
                self.counters
                    .entry(credential_id.to_string())
                    .or_default()
                    .value(),
            ),
        };
        entry.lock().record(succeeded, at);
    }

    /// Drop a credential's own counters, folding them into the global history.
    pub fn remove(&self, credential_id: &str) {
        if let Some((_, entry)) = self.counters.remove(credential_id) {
            let counter = entry.lock().clone();
            self.removed.lock().merge(&counter);
        }
    }

    /// Usage of one credential, if it has recorded anything.
    pub fn credential_snapshot(&self, credential_id: &str, now: DateTime<Utc>) -> Option<UsageSnapshot> {
        let entry = self
            .counters
            .get(credential_id)
            .map(|e| Arc::clone(e.value()))?;
        let snapshot = entry.lock().snapshot(now);
        Some(snapshot)
    }

    /// Per-credential and summed usage at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> UsageReport {
        let entries: Vec<(String, Arc<Mutex<UsageCounter>>)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut report = UsageReport {
            global: self.removed.lock().snapshot(now),
            credentials: BTreeMap::new(),
        };
        for (id, counter) in entries {
            let snapshot = counter.lock().snapshot(now);
            report.global = report.global + snapshot;
            report.credentials.insert(id, snapshot);
        }
        report
    }
}
