//! Fixed-slot rolling counters.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

/// Totals for one window.
///
/// `success_rate` is a percentage rounded to one decimal, `None` when the
/// window is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub total: u64,
    pub succeeded: u64,
    pub success_rate: Option<f64>,
}

impl WindowStats {
    pub fn new(total: u64, succeeded: u64) -> Self {
        let succeeded = succeeded.min(total);
        let success_rate = if total == 0 {
            None
        } else {
            let pct = succeeded as f64 / total as f64 * 100.0;
            Some((pct * 10.0).round() / 10.0)
        };
        Self {
            total,
            succeeded,
            success_rate,
        }
    }

    pub fn failed(&self) -> u64 {
        self.total - self.succeeded
    }

    /// `"80.0%"`, or `"N/A"` for an empty window.
    pub fn rate_display(&self) -> String {
        match self.success_rate {
            Some(rate) => format!("{:.1}%", rate),
            None => "N/A".to_string(),
        }
    }
}

impl std::ops::Add for WindowStats {
    type Output = WindowStats;

    fn add(self, rhs: WindowStats) -> WindowStats {
        WindowStats::new(self.total + rhs.total, self.succeeded + rhs.succeeded)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    index: i64,
    total: u64,
    succeeded: u64,
}

/// A ring of `len` slots, each covering `slot_secs` seconds.
///
/// Slots are recycled lazily: a write to a slot still holding an older
/// index clears it first, and reads ignore slots outside the window.
#[derive(Debug, Clone)]
pub struct SlotRing {
    slot_secs: i64,
    slots: Vec<Slot>,
}

impl SlotRing {
    pub fn new(len: usize, slot_secs: i64) -> Self {
        Self {
            slot_secs,
            slots: vec![
                Slot {
                    index: i64::MIN,
                    ..Slot::default()
                };
                len
            ],
        }
    }

    fn index_of(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.slot_secs)
    }

    fn position(&self, index: i64) -> usize {
        index.rem_euclid(self.slots.len() as i64) as usize
    }

    pub fn record(&mut self, succeeded: bool, at: DateTime<Utc>) {
        let index = self.index_of(at);
        let position = self.position(index);
        let slot = &mut self.slots[position];
        if slot.index > index {
            // the slot already holds a newer period; the event is out of the window
            return;
        }
        if slot.index != index {
            *slot = Slot {
                index,
                ..Slot::default()
            };
        }
        slot.total += 1;
        if succeeded {
            slot.succeeded += 1;
        }
    }

    pub fn stats(&self, now: DateTime<Utc>) -> WindowStats {
        let current = self.index_of(now);
        let oldest = current - self.slots.len() as i64;
        let (total, succeeded) = self
            .slots
            .iter()
            .filter(|slot| slot.index > oldest && slot.index <= current)
            .fold((0, 0), |(t, s), slot| (t + slot.total, s + slot.succeeded));
        WindowStats::new(total, succeeded)
    }

    /// Fold another ring of the same shape into this one.
    pub fn merge(&mut self, other: &SlotRing) {
        for (mine, theirs) in self.slots.iter_mut().zip(&other.slots) {
            if theirs.index == i64::MIN {
                continue;
            }
            if mine.index == theirs.index {
                mine.total += theirs.total;
                mine.succeeded += theirs.succeeded;
            } else if mine.index < theirs.index {
                *mine = *theirs;
            }
        }
    }
}

/// Counter for the current UTC calendar month.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthCounter {
    period: Option<(i32, u32)>,
    total: u64,
    succeeded: u64,
}

impl MonthCounter {
    fn period_of(at: DateTime<Utc>) -> (i32, u32) {
        (at.year(), at.month())
    }

    pub fn record(&mut self, succeeded: bool, at: DateTime<Utc>) {
        let period = Self::period_of(at);
        match self.period {
            Some(current) if current > period => return,
            Some(current) if current == period => {}
            _ => {
                *self = MonthCounter {
                    period: Some(period),
                    ..MonthCounter::default()
                };
            }
        }
        self.total += 1;
        if succeeded {
            self.succeeded += 1;
        }
    }

    pub fn stats(&self, now: DateTime<Utc>) -> WindowStats {
        if self.period == Some(Self::period_of(now)) {
            WindowStats::new(self.total, self.succeeded)
        } else {
            WindowStats::default()
        }
    }

    pub fn merge(&mut self, other: &MonthCounter) {
        match (self.period, other.period) {
            (_, None) => {}
            (Some(mine), Some(theirs)) if mine == theirs => {
                self.total += other.total;
                self.succeeded += other.succeeded;
            }
            (Some(mine), Some(theirs)) if mine > theirs => {}
            _ => *self = *other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_window_stats_rate() {
        let stats = WindowStats::new(10, 8);
        assert_eq!(stats.success_rate, Some(80.0));
        assert_eq!(stats.rate_display(), "80.0%");
        assert_eq!(stats.failed(), 2);
    }

    #[test]
    fn test_window_stats_empty_is_na() {
        let stats = WindowStats::new(0, 0);
        assert_eq!(stats.success_rate, None);
        assert_eq!(stats.rate_display(), "N/A");
    }

    #[test]
    fn test_window_stats_rounds_to_one_decimal() {
        assert_eq!(WindowStats::new(3, 2).success_rate, Some(66.7));
        assert_eq!(WindowStats::new(3, 1).success_rate, Some(33.3));
    }

    #[test]
    fn test_window_stats_clamps_succeeded() {
        let stats = WindowStats::new(2, 5);
        assert_eq!(stats.succeeded, 2);
    }

    #[test]
    fn test_ring_slides() {
        let mut ring = SlotRing::new(60, 1);
        ring.record(true, t0());
        ring.record(false, t0() + Duration::seconds(30));

        assert_eq!(ring.stats(t0() + Duration::seconds(30)).total, 2);
        assert_eq!(ring.stats(t0() + Duration::seconds(60)).total, 1);
        assert_eq!(ring.stats(t0() + Duration::seconds(90)).total, 0);
    }

    #[test]
    fn test_ring_recycles_stale_slot() {
        let mut ring = SlotRing::new(60, 1);
        ring.record(true, t0());
        // same ring position one full lap later
        ring.record(false, t0() + Duration::seconds(60));

        let stats = ring.stats(t0() + Duration::seconds(60));
        assert_eq!(stats.total, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[test]
    fn test_ring_merge() {
        let mut a = SlotRing::new(60, 1);
        let mut b = SlotRing::new(60, 1);
        a.record(true, t0());
        b.record(true, t0());
        b.record(false, t0() + Duration::seconds(5));
        a.merge(&b);

        let stats = a.stats(t0() + Duration::seconds(5));
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 2);
    }

    #[test]
    fn test_month_rolls_over() {
        let mut month = MonthCounter::default();
        month.record(true, t0());
        month.record(true, t0());
        assert_eq!(month.stats(t0()).total, 2);

        let february = DateTime::parse_from_rfc3339("2025-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(month.stats(february).total, 0);

        month.record(false, february);
        assert_eq!(month.stats(february).total, 1);
    }

    #[test]
    fn test_month_ignores_older_events() {
        let mut month = MonthCounter::default();
        month.record(true, t0());
        month.record(true, t0() - Duration::days(30));
        assert_eq!(month.stats(t0()).total, 1);
    }
}
