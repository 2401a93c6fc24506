// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The append-only relay transition log (spec §4.3). The engine talks to
//! history through the small [`HistoryStore`] capability set; tests use
//! [`InMemoryHistory`] directly, production wraps it with file persistence
//! via [`FileHistory`](crate::history::file::FileHistory).

mod file;
mod memory;

pub use file::FileHistory;
pub use memory::InMemoryHistory;

use chrono::{DateTime, Utc};
use hydro_types::{Event, MAX_RELAYS, RelayState};
use std::time::Duration;

/// The capability set the decision engine needs from history. Iterators
/// returned by [`reverse_iter`](HistoryStore::reverse_iter) never outlive
/// the borrow that produced them.
pub trait HistoryStore {
    /// Buffer an event. Not durable until [`commit`](HistoryStore::commit).
    fn append(&mut self, event: Event);

    /// Atomically persist every buffered event.
    fn commit(&mut self) -> anyhow::Result<()>;

    /// Total wall-clock time `relay` was on within `[t0, t1]`.
    fn on_duration(&self, relay: u8, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Duration;

    /// The most recent transition for `relay`, or `(false, UNIX_EPOCH)` if none.
    fn latest_change(&self, relay: u8) -> (bool, DateTime<Utc>);

    /// All committed events, newest first, across every relay.
    fn reverse_iter(&self) -> Box<dyn Iterator<Item = Event> + '_>;
}

/// Overlap, in seconds, between `[a, b]` and `[t0, t1]`, clamped to zero.
pub(crate) fn overlap(a: DateTime<Utc>, b: DateTime<Utc>, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Duration {
    let lo = a.max(t0);
    let hi = b.min(t1);
    (hi - lo).to_std().unwrap_or(Duration::ZERO)
}

/// Computes `on_duration` over an already time-ordered slice of a single
/// relay's events (spec §4.3's cursor-walk algorithm). Resilient to two
/// consecutive `on` events (the second is ignored).
pub(crate) fn on_duration_over(events: &[Event], t0: DateTime<Utc>, t1: DateTime<Utc>) -> Duration {
    let mut total = Duration::ZERO;
    let mut on_since: Option<DateTime<Utc>> = None;
    for event in events {
        if event.on {
            on_since.get_or_insert(event.time);
        } else if let Some(since) = on_since.take() {
            total += overlap(since, event.time, t0, t1);
        }
    }
    if let Some(since) = on_since {
        total += overlap(since, t1, t0, t1);
    }
    total
}

/// Append discipline the worker follows after applying a decision (spec
/// §4.3): for each relay, compare the intended state against history's
/// belief and append an event iff they differ. A relay with no history at
/// all is assumed off; recording a first event that is itself "off" would
/// be a no-op observation, so it is skipped.
pub fn record_state(store: &mut dyn HistoryStore, new_state: &RelayState, now: DateTime<Utc>) {
    for relay in 0..MAX_RELAYS as u8 {
        let intended_on = new_state.is_set(relay);
        let (latest_on, latest_time) = store.latest_change(relay);
        let has_history = latest_time != DateTime::<Utc>::UNIX_EPOCH;

        if has_history && intended_on == latest_on {
            continue;
        }
        if !has_history && !intended_on {
            continue;
        }
        store.append(Event::new(relay, now, intended_on));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(h)
    }

    #[test]
    fn on_duration_walks_open_and_closed_intervals() {
        let events = vec![Event::new(0, t(1), true), Event::new(0, t(3), false), Event::new(0, t(5), true)];
        // closed [1,3) contributes 2h, open [5, t1=8) contributes 3h.
        let total = on_duration_over(&events, t(0), t(8));
        assert_eq!(total, Duration::from_secs(5 * 3600));
    }

    #[test]
    fn on_duration_ignores_duplicate_on_events() {
        let events = vec![Event::new(0, t(1), true), Event::new(0, t(2), true), Event::new(0, t(3), false)];
        let total = on_duration_over(&events, t(0), t(4));
        assert_eq!(total, Duration::from_secs(2 * 3600));
    }

    #[test]
    fn record_state_skips_first_off_event() {
        let mut store = InMemoryHistory::new();
        record_state(&mut store, &RelayState::empty(), t(0));
        store.commit().unwrap();
        assert_eq!(store.latest_change(0), (false, DateTime::<Utc>::UNIX_EPOCH));
    }

    #[test]
    fn record_state_appends_on_event_from_no_history() {
        let mut store = InMemoryHistory::new();
        let state = RelayState::empty().with_bit_set(0);
        record_state(&mut store, &state, t(1));
        store.commit().unwrap();
        assert_eq!(store.latest_change(0), (true, t(1)));
    }

    #[test]
    fn record_state_is_a_no_op_when_state_is_unchanged() {
        let mut store = InMemoryHistory::new();
        let state = RelayState::empty().with_bit_set(0);
        record_state(&mut store, &state, t(1));
        store.commit().unwrap();
        record_state(&mut store, &state, t(2));
        store.commit().unwrap();
        assert_eq!(store.latest_change(0), (true, t(1)));
    }
}
