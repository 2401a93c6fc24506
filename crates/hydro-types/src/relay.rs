// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use crate::slot::Slot;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the number of relays a single installation can drive.
pub const MAX_RELAYS: usize = 32;

/// Default hysteresis: minimum time a relay must sit in its current state
/// before it is allowed to turn on.
pub const DEFAULT_MINIMUM_CHANGE_DURATION: Duration = Duration::from_secs(5);

/// Default grace period after the most recent relay transition before
/// meter readings are trusted for discretionary decisions.
pub const DEFAULT_METER_REACTION_DURATION: Duration = Duration::from_secs(10);

/// Default minimum on-time a relay is protected before a peer can pre-empt it.
pub const DEFAULT_CYCLE_DURATION: Duration = Duration::from_secs(5 * 60);

/// How a relay's schedule is governed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayMode {
    AlwaysOff,
    AlwaysOn,
    InUse,
    NotInUse,
}

/// Static, per-relay configuration derived from the schedule grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub mode: RelayMode,
    pub max_power_watts: u32,
    pub in_use_slots: Vec<Slot>,
    pub not_in_use_slots: Vec<Slot>,
    pub cohort_name: String,
}

impl RelayConfig {
    /// Slots that govern this relay under its configured mode.
    pub fn active_slots(&self) -> &[Slot] {
        match self.mode {
            RelayMode::InUse => &self.in_use_slots,
            RelayMode::NotInUse => &self.not_in_use_slots,
            RelayMode::AlwaysOff | RelayMode::AlwaysOn => &[],
        }
    }
}

/// A named group of relays sharing identical scheduling semantics,
/// as declared in the schedule grammar. Parser-level only — at runtime
/// relays are addressed individually via [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub name: String,
    pub short_name: Option<String>,
    pub relays: Vec<u8>,
    pub mode: RelayMode,
    pub in_use_slots: Vec<Slot>,
    pub not_in_use_slots: Vec<Slot>,
}

/// Global tunables, part of [`Config`] rather than process-wide so the
/// engine reads them from its arguments (see spec's decision engine design
/// notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTunables {
    pub minimum_change_duration: Duration,
    pub meter_reaction_duration: Duration,
    pub cycle_duration: Duration,
}

impl Default for EngineTunables {
    fn default() -> Self {
        Self {
            minimum_change_duration: DEFAULT_MINIMUM_CHANGE_DURATION,
            meter_reaction_duration: DEFAULT_METER_REACTION_DURATION,
            cycle_duration: DEFAULT_CYCLE_DURATION,
        }
    }
}

/// The full, validated schedule configuration: an indexed list of relays
/// (at most [`MAX_RELAYS`] entries, by relay number) plus the engine's
/// tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    relays: Vec<Option<RelayConfig>>,
    pub tunables: EngineTunables,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relays: std::iter::repeat_with(|| None).take(MAX_RELAYS).collect(),
            tunables: EngineTunables::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the configuration for relay `i`, if any relay has been
    /// declared at that number.
    pub fn relay(&self, i: u8) -> Option<&RelayConfig> {
        self.relays.get(usize::from(i)).and_then(Option::as_ref)
    }

    /// Set the configuration for relay `i`. Panics if `i >= MAX_RELAYS`
    /// (an out-of-bounds relay index is a programmer error, not a runtime
    /// condition the parser should ever produce after validation).
    pub fn set_relay(&mut self, i: u8, config: RelayConfig) {
        assert!(usize::from(i) < MAX_RELAYS, "relay index {i} out of bounds");
        self.relays[usize::from(i)] = Some(config);
    }

    /// Iterate over configured relays as `(index, config)` pairs, in
    /// ascending relay-number order.
    pub fn configured_relays(&self) -> impl Iterator<Item = (u8, &RelayConfig)> {
        self.relays
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i as u8, c)))
    }
}

/// A bitset over `[0, MAX_RELAYS)` recording which relays are energized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayState(u32);

impl RelayState {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_set(&self, relay: u8) -> bool {
        assert!(usize::from(relay) < MAX_RELAYS, "relay index {relay} out of bounds");
        (self.0 >> relay) & 1 == 1
    }

    #[must_use]
    pub fn with_bit_set(&self, relay: u8) -> Self {
        assert!(usize::from(relay) < MAX_RELAYS, "relay index {relay} out of bounds");
        Self(self.0 | (1 << relay))
    }

    #[must_use]
    pub fn with_bit_cleared(&self, relay: u8) -> Self {
        assert!(usize::from(relay) < MAX_RELAYS, "relay index {relay} out of bounds");
        Self(self.0 & !(1 << relay))
    }

    pub fn iter_set(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_RELAYS as u8).filter(move |&i| self.is_set(i))
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_state_bit_ops() {
        let s = RelayState::empty();
        assert!(!s.is_set(3));
        let s = s.with_bit_set(3);
        assert!(s.is_set(3));
        assert!(!s.is_set(4));
        let s = s.with_bit_set(4).with_bit_cleared(3);
        assert!(!s.is_set(3));
        assert!(s.is_set(4));
    }

    #[test]
    #[should_panic]
    fn relay_state_out_of_bounds_panics() {
        let s = RelayState::empty();
        s.is_set(32);
    }

    #[test]
    fn config_defaults_to_no_relays_configured() {
        let config = Config::default();
        assert!(config.relay(0).is_none());
        assert_eq!(config.configured_relays().count(), 0);
    }
}
