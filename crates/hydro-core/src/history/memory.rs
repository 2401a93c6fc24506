// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use chrono::{DateTime, Utc};
use hydro_types::{Event, MAX_RELAYS};
use std::time::Duration;

use super::{HistoryStore, on_duration_over};

/// Pure in-memory transition log. The default test double; [`FileHistory`](
/// super::FileHistory) wraps one of these to add disk persistence.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistory {
    committed: Vec<Event>,
    pending: Vec<Event>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a history pre-seeded with already-committed events, e.g.
    /// for tests that want a specific switching history without going
    /// through [`super::record_state`].
    pub fn with_events(events: Vec<Event>) -> Self {
        Self { committed: events, pending: Vec::new() }
    }

    /// Test convenience: append and immediately commit a batch of events.
    pub fn commit_events(&mut self, events: Vec<Event>) {
        self.committed.extend(events);
    }

    pub(crate) fn committed_events(&self) -> &[Event] {
        &self.committed
    }

    pub(crate) fn pending_events(&self) -> &[Event] {
        &self.pending
    }

    fn events_for(&self, relay: u8) -> impl Iterator<Item = &Event> {
        self.committed.iter().filter(move |e| e.relay == relay)
    }
}

impl HistoryStore for InMemoryHistory {
    fn append(&mut self, event: Event) {
        self.pending.push(event);
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.committed.append(&mut self.pending);
        Ok(())
    }

    fn on_duration(&self, relay: u8, t0: DateTime<Utc>, t1: DateTime<Utc>) -> Duration {
        let events: Vec<Event> = self.events_for(relay).copied().collect();
        on_duration_over(&events, t0, t1)
    }

    fn latest_change(&self, relay: u8) -> (bool, DateTime<Utc>) {
        self.events_for(relay)
            .max_by_key(|e| e.time)
            .map_or((false, DateTime::<Utc>::UNIX_EPOCH), |e| (e.on, e.time))
    }

    fn reverse_iter(&self) -> Box<dyn Iterator<Item = Event> + '_> {
        Box::new(self.committed.iter().rev().copied())
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
    fn append_is_not_visible_until_commit() {
        let mut h = InMemoryHistory::new();
        h.append(Event::new(0, t(0), true));
        assert_eq!(h.latest_change(0), (false, DateTime::<Utc>::UNIX_EPOCH));
        h.commit().unwrap();
        assert_eq!(h.latest_change(0), (true, t(0)));
    }

    #[test]
    fn reverse_iter_is_newest_first() {
        let h = InMemoryHistory::with_events(vec![
            Event::new(0, t(0), true),
            Event::new(1, t(1), true),
            Event::new(0, t(2), false),
        ]);
        let times: Vec<_> = h.reverse_iter().map(|e| e.time).collect();
        assert_eq!(times, vec![t(2), t(1), t(0)]);
    }

    #[test]
    fn on_duration_respects_max_relays_bound() {
        let h = InMemoryHistory::new();
        assert_eq!(h.on_duration((MAX_RELAYS - 1) as u8, t(0), t(1)), Duration::ZERO);
    }
}
