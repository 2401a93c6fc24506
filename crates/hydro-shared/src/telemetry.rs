// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use chrono::{DateTime, Utc};
use hydro_types::{Event, RelayState, MAX_RELAYS};
use serde::{Deserialize, Serialize};

/// Per-relay status as of the most recent heartbeat: whether it is on, and
/// when it last changed (spec §6's "Updater interface").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayStatus {
    pub on: bool,
    pub since: DateTime<Utc>,
}

/// Emitted by the worker after a successfully applied decision: the new
/// relay state plus a per-relay breakdown of on/off and since-when, for
/// downstream observers (the snapshot endpoint, future report rendering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub state: RelayState,
    pub relays: Vec<RelayStatus>,
    /// The most recent transitions across all relays, newest first, as
    /// read from `HistoryStore::reverse_iter`. Diagnostics-only.
    pub recent_transitions: Vec<Event>,
}

impl Update {
    /// Builds an `Update` from the applied state and a `(on, since)` lookup
    /// over `[0, MAX_RELAYS)`, as the worker gets from `HistoryStore::latest_change`.
    pub fn new(state: RelayState, mut latest_change: impl FnMut(u8) -> (bool, DateTime<Utc>)) -> Self {
        let relays = (0..MAX_RELAYS as u8)
            .map(|relay| {
                let (on, since) = latest_change(relay);
                RelayStatus { on, since }
            })
            .collect();
        Self { state, relays, recent_transitions: Vec::new() }
    }

    /// Attaches the N most recent transitions (newest first) for diagnostics.
    pub fn with_recent_transitions(mut self, recent: impl IntoIterator<Item = Event>) -> Self {
        self.recent_transitions = recent.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_captures_one_status_per_relay() {
        let state = RelayState::empty().with_bit_set(2);
        let update = Update::new(state, |relay| (relay == 2, DateTime::<Utc>::UNIX_EPOCH));
        assert_eq!(update.relays.len(), MAX_RELAYS);
        assert!(update.relays[2].on);
        assert!(!update.relays[0].on);
        assert!(update.recent_transitions.is_empty());
    }

    #[test]
    fn with_recent_transitions_attaches_the_given_events() {
        let state = RelayState::empty();
        let update = Update::new(state, |_| (false, DateTime::<Utc>::UNIX_EPOCH))
            .with_recent_transitions([Event::new(2, Utc::now(), true)]);
        assert_eq!(update.recent_transitions.len(), 1);
        assert_eq!(update.recent_transitions[0].relay, 2);
    }
}
