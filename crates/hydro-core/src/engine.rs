// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The decision engine (spec §4.5): a pure function from `(config,
//! current_state, history, power_sample, now)` to the next [`RelayState`].
//! No I/O, no suspension points — every call must resolve in microseconds.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use hydro_types::{Config, PowerUseSample, RelayConfig, RelayMode, RelayState, Slot, SlotKind, MAX_RELAYS};

use crate::history::HistoryStore;
use crate::logging::Logger;

const RETENTION_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// Where a relay's desired state sits in the pre-emption order.
/// Declaration order is the rank order: `Low < High < Absolute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
    Absolute,
}

#[derive(Debug, Clone, Copy)]
struct RelayDecision {
    desired_on: bool,
    priority: Priority,
    /// The instant the active slot began, if this decision came from a slot lookup.
    slot_start: Option<DateTime<Utc>>,
}

impl RelayDecision {
    fn absolute(desired_on: bool) -> Self {
        Self { desired_on, priority: Priority::Absolute, slot_start: None }
    }

    fn inverted(self) -> Self {
        Self { desired_on: !self.desired_on, ..self }
    }
}

struct Entry {
    relay: u8,
    desired_on: bool,
    priority: Priority,
    on_duration_within_window: Duration,
    latest_state: bool,
    latest_state_duration: Duration,
    max_power: u32,
}

/// Produce the next relay state from the current configuration, state,
/// switching history, and a recent meter sample. `tz` is the installation's
/// configured local time zone, used to resolve slot occupancy (spec §4.1);
/// it is not part of `spec.md`'s data model but is required to evaluate
/// `Slot::active_at`, so the worker passes it in explicitly alongside `now`.
pub fn assess(
    config: &Config,
    current_state: RelayState,
    history: &dyn HistoryStore,
    sample: PowerUseSample,
    now: DateTime<Utc>,
    tz: Tz,
    logger: &mut dyn Logger,
) -> RelayState {
    let tunables = config.tunables;

    let decisions: Vec<(u8, RelayDecision)> =
        config.configured_relays().map(|(relay, rc)| (relay, classify(rc, now, tz, history, relay))).collect();

    let mut result = current_state;
    let mut must_turn_on: Option<u8> = None;

    for &(relay, dec) in &decisions {
        if dec.priority != Priority::Absolute {
            continue;
        }
        if dec.desired_on {
            if !result.is_set(relay) && must_turn_on.is_none() {
                must_turn_on = Some(relay);
            }
        } else if result.is_set(relay) {
            result = result.with_bit_cleared(relay);
            logger.log(&format!("relay {relay} turned off: absolute priority (off/not-in-slot)"));
        }
    }

    let gate_open = turn_on_gate_open(history, now, tunables.minimum_change_duration);

    let now_minus_retention = now - ChronoDuration::from_std(RETENTION_WINDOW).unwrap_or_default();
    let discretionary: Vec<(u8, RelayDecision)> =
        decisions.iter().copied().filter(|(_, d)| d.priority != Priority::Absolute).collect();
    let earliest_slot_start = discretionary
        .iter()
        .filter_map(|(_, d)| d.slot_start)
        .min()
        .map(|t| t.max(now_minus_retention))
        .unwrap_or(now_minus_retention);

    let mut entries: Vec<Entry> = discretionary
        .iter()
        .map(|&(relay, dec)| {
            let max_power = config.relay(relay).map(RelayConfig::max_power_watts).unwrap_or(0);
            let on_duration_within_window = history.on_duration(relay, earliest_slot_start, now);
            let (latest_on, latest_time) = history.latest_change(relay);
            let latest_state_duration = if latest_time == DateTime::<Utc>::UNIX_EPOCH {
                RETENTION_WINDOW
            } else {
                ((now - latest_time).to_std().unwrap_or(Duration::ZERO)).min(RETENTION_WINDOW)
            };
            Entry {
                relay,
                desired_on: dec.desired_on,
                priority: dec.priority,
                on_duration_within_window,
                latest_state: latest_on,
                latest_state_duration,
                max_power,
            }
        })
        .collect();

    if let Some(relay) = must_turn_on {
        if gate_open {
            for e in &entries {
                if result.is_set(e.relay) {
                    result = result.with_bit_cleared(e.relay);
                    logger.log(&format!("relay {} turned off: deferring to absolute relay {relay}", e.relay));
                }
            }
            result = result.with_bit_set(relay);
            logger.log(&format!("relay {relay} turned on: absolute priority"));
            return result;
        }
    }

    let latest_change_time = (0..MAX_RELAYS as u8)
        .filter_map(|relay| {
            let (_, time) = history.latest_change(relay);
            (time != DateTime::<Utc>::UNIX_EPOCH).then_some(time)
        })
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let settled_time =
        latest_change_time + ChronoDuration::from_std(tunables.meter_reaction_duration).unwrap_or_default();

    if !sample.is_present() {
        return result;
    }
    if sample.t0 < latest_change_time {
        return result;
    }
    if sample.t0 < settled_time {
        return result;
    }

    entries.sort_by(|a, b| rank(a, b, tunables.cycle_duration));

    let chargeable = sample.power_use.chargeable();
    if chargeable.import_here > 0.0 {
        let imported_total = chargeable.import_here + chargeable.import_neighbour;
        let total_available = sample.power_use.here + sample.power_use.neighbour - imported_total;
        let regain_target = f64::from(sample.power_use.here) - f64::from(total_available) / 2.0;
        return shed_until(&entries, result, regain_target, logger);
    }

    if !gate_open {
        return result;
    }

    let mut any_higher_on = false;
    for e in entries.iter().rev() {
        if result.is_set(e.relay) {
            any_higher_on = true;
            continue;
        }

        let mut hypothetical = sample.power_use;
        hypothetical.here += e.max_power as f32;
        let possible_import = hypothetical.chargeable().import_here;

        if possible_import > 0.0 {
            if any_higher_on {
                continue;
            }
            match try_shed_atomic(&entries, result, f64::from(possible_import)) {
                Some(new_state) => {
                    result = new_state;
                    logger.log(&format!("shedding power so relay {} can turn on next tick", e.relay));
                    break;
                }
                None => continue,
            }
        }

        if e.latest_state_duration >= tunables.minimum_change_duration {
            result = result.with_bit_set(e.relay);
            logger.log(&format!("relay {} turned on: discretionary, no import", e.relay));
            break;
        }
    }

    result
}

/// Classifies a single relay's desired state and priority per spec §4.5.1.
fn classify(rc: &RelayConfig, now: DateTime<Utc>, tz: Tz, history: &dyn HistoryStore, relay: u8) -> RelayDecision {
    match rc.mode {
        RelayMode::AlwaysOff => RelayDecision::absolute(false),
        RelayMode::AlwaysOn => RelayDecision::absolute(true),
        RelayMode::InUse => classify_slots(rc.active_slots(), now, tz, history, relay),
        RelayMode::NotInUse => classify_slots(rc.active_slots(), now, tz, history, relay).inverted(),
    }
}

fn classify_slots(slots: &[Slot], now: DateTime<Utc>, tz: Tz, history: &dyn HistoryStore, relay: u8) -> RelayDecision {
    let Some((slot, slot_start)) = slots.iter().find_map(|s| s.active_at(now, tz).map(|start| (s, start))) else {
        return RelayDecision::absolute(false);
    };

    let already_on = history.on_duration(relay, slot_start, now);
    let slot_end = slot_start + slot.length();
    let remaining = (slot_end - now).to_std().unwrap_or(Duration::ZERO);
    let needed = slot.duration.saturating_sub(already_on);
    let must_run = remaining <= needed;
    let quota_met = already_on >= slot.duration;

    let (desired_on, priority) = match slot.kind {
        SlotKind::Continuous => (true, Priority::Absolute),
        SlotKind::Exactly if must_run => (true, Priority::Absolute),
        SlotKind::Exactly if quota_met => (false, Priority::Absolute),
        SlotKind::Exactly => (true, Priority::High),
        SlotKind::AtLeast if must_run => (true, Priority::Absolute),
        SlotKind::AtLeast => (true, Priority::High),
        SlotKind::AtMost if quota_met => (false, Priority::Absolute),
        SlotKind::AtMost => (true, Priority::Low),
    };

    RelayDecision { desired_on, priority, slot_start: Some(slot_start) }
}

/// True iff no relay anywhere was switched on within `minimum_change_duration` of `now`.
fn turn_on_gate_open(history: &dyn HistoryStore, now: DateTime<Utc>, minimum_change_duration: Duration) -> bool {
    (0..MAX_RELAYS as u8).all(|relay| {
        let (on, time) = history.latest_change(relay);
        if !on || time == DateTime::<Utc>::UNIX_EPOCH {
            return true;
        }
        (now - time).to_std().unwrap_or(Duration::ZERO) >= minimum_change_duration
    })
}

/// Ordering comparator for §4.5.6: ascending = lowest priority first.
fn rank(a: &Entry, b: &Entry, cycle_duration: Duration) -> Ordering {
    match a.priority.cmp(&b.priority) {
        Ordering::Equal => {}
        other => return other,
    }

    if a.desired_on && b.desired_on {
        let a_in_cycle = a.latest_state && a.latest_state_duration < cycle_duration;
        let b_in_cycle = b.latest_state && b.latest_state_duration < cycle_duration;
        if a_in_cycle != b_in_cycle {
            return if a_in_cycle { Ordering::Greater } else { Ordering::Less };
        }
    }

    match b.on_duration_within_window.cmp(&a.on_duration_within_window) {
        Ordering::Equal => {}
        other => return other,
    }

    b.relay.cmp(&a.relay)
}

/// §4.5.7: turn off discretionary relays lowest-to-highest priority until
/// `target` watts have been shed (or the list is exhausted). Best-effort —
/// partial progress is committed even if the target isn't fully met.
fn shed_until(entries: &[Entry], mut result: RelayState, target: f64, logger: &mut dyn Logger) -> RelayState {
    let mut regain = target;
    for e in entries {
        if regain <= 0.0 {
            break;
        }
        if result.is_set(e.relay) {
            result = result.with_bit_cleared(e.relay);
            regain -= f64::from(e.max_power);
            logger.log(&format!("relay {} shed to curb grid import", e.relay));
        }
    }
    result
}

/// Like [`shed_until`] but atomic: simulates the shed first and only
/// returns `Some` (with the turn-offs applied) if `target` watts could
/// actually be freed. Used by the turn-on phase (§4.5.8), which must not
/// partially shed power it cannot fully recover.
fn try_shed_atomic(entries: &[Entry], result: RelayState, target: f64) -> Option<RelayState> {
    let mut candidate = result;
    let mut freed = 0.0;
    for e in entries {
        if freed >= target {
            break;
        }
        if candidate.is_set(e.relay) {
            candidate = candidate.with_bit_cleared(e.relay);
            freed += f64::from(e.max_power);
        }
    }
    (freed >= target).then_some(candidate)
}
