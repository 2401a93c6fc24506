// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use crate::time::TimeOfDay;
use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The quota semantics of a [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// The relay should be on for the entire slot.
    Continuous,
    /// The relay must accumulate exactly `duration` of on-time within the slot.
    Exactly,
    /// The relay must accumulate at least `duration` of on-time within the slot.
    AtLeast,
    /// The relay must accumulate at most `duration` of on-time within the slot.
    AtMost,
}

/// A contiguous, possibly day-wrapping window of a day plus a quota.
///
/// Invariants: slot length is in `(0, 24h]`; `duration <= length()` for all
/// kinds but `Continuous`, where `duration` is defined to equal `length()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub kind: SlotKind,
    pub duration: Duration,
}

impl Slot {
    pub fn new(start: TimeOfDay, end: TimeOfDay, kind: SlotKind, duration: Duration) -> Self {
        let mut slot = Self { start, end, kind, duration };
        if kind == SlotKind::Continuous {
            slot.duration = slot.length_duration();
        }
        slot
    }

    /// Length of the window, accounting for midnight wrap. Zero-length iff
    /// `start == end`.
    pub fn length(&self) -> ChronoDuration {
        let s = i64::from(self.start.seconds());
        let e = i64::from(self.end.seconds());
        let secs = if e <= s {
            (i64::from(TimeOfDay::SECONDS_PER_DAY) - s) + e
        } else {
            e - s
        };
        ChronoDuration::seconds(secs)
    }

    fn length_duration(&self) -> Duration {
        self.length().to_std().unwrap_or(Duration::ZERO)
    }

    /// Non-wrapping sub-intervals (in seconds-since-midnight) covered by this slot.
    ///
    /// `start == end` is the all-day slot (length 24h by the wrap formula
    /// above), not a zero-length one — this type has no way to construct a
    /// genuine zero-length window, matching the invariant that slot length
    /// is always in `(0, 24h]`.
    fn segments(&self) -> Vec<(u32, u32)> {
        let s = self.start.seconds();
        let len = self.length().num_seconds() as u32;
        let e = s + len;
        if e <= TimeOfDay::SECONDS_PER_DAY {
            vec![(s, e)]
        } else {
            vec![(s, TimeOfDay::SECONDS_PER_DAY), (0, e - TimeOfDay::SECONDS_PER_DAY)]
        }
    }

    /// True iff both slots have non-zero length and their day-wrapped
    /// intervals intersect. Symmetric and reflexive for non-empty slots; an
    /// empty slot overlaps nothing (including itself).
    pub fn overlaps(&self, other: &Slot) -> bool {
        let mine = self.segments();
        let theirs = other.segments();
        mine.iter()
            .any(|&(a0, a1)| theirs.iter().any(|&(b0, b1)| a0 < b1 && b0 < a1))
    }

    /// Returns the wall-clock instant at which the currently active
    /// occurrence of this slot began, or `None` if the slot is not active at
    /// `now`.
    ///
    /// Locates the most recent local-day start, adds `slot.start`, and
    /// checks whether `now` falls in `[start, start + length)`. If the slot
    /// wraps midnight, the previous day's occurrence is tried too. DST
    /// spring-forward: if the nominal start falls in a skipped local hour,
    /// the slot is treated as beginning at the next legal local instant.
    pub fn active_at(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&tz);
        let today = local_now.date_naive();
        let length = self.length();

        for day_offset in [0i64, -1] {
            let day = today + ChronoDuration::days(day_offset);
            let Some(start_local) = local_day_start_at(tz, day, self.start) else {
                continue;
            };
            let start_utc = start_local.with_timezone(&Utc);
            let end_utc = start_utc + length;
            if now >= start_utc && now < end_utc {
                return Some(start_utc);
            }
        }
        None
    }
}

/// Resolves `day` at local time `tod` under `tz`, handling the DST
/// spring-forward gap by advancing to the next legal local instant.
fn local_day_start_at(tz: Tz, day: chrono::NaiveDate, tod: TimeOfDay) -> Option<DateTime<Tz>> {
    let naive_time = NaiveTime::from_num_seconds_from_midnight_opt(tod.seconds(), 0)?;
    let naive = day.and_time(naive_time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        // Fall-back (clocks set back): two legal instants map to this naive
        // time; take the first (earlier) one.
        LocalResult::Ambiguous(earlier, _later) => Some(earlier),
        // Spring-forward gap: no legal instant maps to this naive time.
        // Advance minute by minute until we find the next legal one.
        LocalResult::None => (1..=180).find_map(|minutes| {
            let candidate = naive + ChronoDuration::minutes(minutes);
            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => Some(dt),
                _ => None,
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> TimeOfDay {
        TimeOfDay::from_hms(h, m, 0).unwrap()
    }

    #[test]
    fn length_non_wrapping() {
        let slot = Slot::new(t(9, 0), t(17, 0), SlotKind::Continuous, Duration::ZERO);
        assert_eq!(slot.length(), ChronoDuration::hours(8));
    }

    #[test]
    fn length_wrapping() {
        let slot = Slot::new(t(22, 0), t(2, 0), SlotKind::Continuous, Duration::ZERO);
        assert_eq!(slot.length(), ChronoDuration::hours(4));
    }

    #[test]
    fn same_start_and_end_is_the_all_day_slot() {
        let all_day = Slot::new(t(9, 0), t(9, 0), SlotKind::Continuous, Duration::ZERO);
        assert_eq!(all_day.length(), ChronoDuration::hours(24));
        let other = Slot::new(t(0, 0), t(23, 59), SlotKind::Continuous, Duration::ZERO);
        assert!(all_day.overlaps(&other));
        assert!(all_day.overlaps(&all_day));
    }

    #[test]
    fn overlap_is_symmetric_and_reflexive() {
        let a = Slot::new(t(11, 0), t(13, 0), SlotKind::Continuous, Duration::ZERO);
        let b = Slot::new(t(12, 0), t(15, 0), SlotKind::Continuous, Duration::ZERO);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn non_overlapping_slots() {
        let a = Slot::new(t(9, 0), t(10, 0), SlotKind::Continuous, Duration::ZERO);
        let b = Slot::new(t(10, 0), t(11, 0), SlotKind::Continuous, Duration::ZERO);
        assert!(!a.overlaps(&b), "exclusive at end: [9,10) and [10,11) must not overlap");
    }

    #[test]
    fn wrapping_slot_overlap() {
        let wrapping = Slot::new(t(22, 0), t(2, 0), SlotKind::Continuous, Duration::ZERO);
        let early_morning = Slot::new(t(1, 0), t(3, 0), SlotKind::Continuous, Duration::ZERO);
        assert!(wrapping.overlaps(&early_morning));
    }

    #[test]
    fn active_at_basic_window() {
        let slot = Slot::new(t(1, 0), t(5, 0), SlotKind::Continuous, Duration::ZERO);
        let utc = chrono_tz::UTC;
        let base = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert!(slot.active_at(base, utc).is_none());
        let at_1 = Utc.with_ymd_and_hms(2000, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(slot.active_at(at_1, utc), Some(at_1));
        let at_445 = Utc.with_ymd_and_hms(2000, 1, 1, 4, 59, 59).unwrap();
        assert_eq!(slot.active_at(at_445, utc), Some(at_1));
        let at_5 = Utc.with_ymd_and_hms(2000, 1, 1, 5, 0, 0).unwrap();
        assert!(slot.active_at(at_5, utc).is_none());
    }

    #[test]
    fn active_at_wrapping_midnight_previous_day() {
        let slot = Slot::new(t(23, 0), t(1, 0), SlotKind::Continuous, Duration::ZERO);
        let utc = chrono_tz::UTC;
        let at_0_30 = Utc.with_ymd_and_hms(2000, 1, 2, 0, 30, 0).unwrap();
        let expected_start = Utc.with_ymd_and_hms(2000, 1, 1, 23, 0, 0).unwrap();
        assert_eq!(slot.active_at(at_0_30, utc), Some(expected_start));
    }
}
