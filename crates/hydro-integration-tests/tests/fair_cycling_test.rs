// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Scenario: three `AtLeast` relays (750W, 800W, 850W) competing for only
//! 1000W of generation. At most one can be on at a time; once the relay
//! currently serving power has held it for `cycle_duration`, the engine
//! sheds it and the next relay (by least accumulated runtime) takes over
//! on a subsequent, settled tick.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use hydro_core::history::{record_state, HistoryStore, InMemoryHistory};
use hydro_core::logging::NullLogger;
use hydro_types::{Config, PowerUse, PowerUseSample, RelayConfig, RelayMode, RelayState, Slot, SlotKind, TimeOfDay};
use std::time::Duration;

fn epoch_plus_secs(s: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(s)
}

fn rotating_config() -> Config {
    let slot = Slot::new(TimeOfDay::MIDNIGHT, TimeOfDay::MIDNIGHT, SlotKind::AtLeast, Duration::from_secs(1));
    let mut config = Config::new();
    config.tunables.cycle_duration = Duration::from_secs(60);
    config.tunables.meter_reaction_duration = Duration::from_secs(1);
    for (relay, power) in [(0u8, 750u32), (1u8, 800u32), (2u8, 850u32)] {
        config.set_relay(
            relay,
            RelayConfig {
                mode: RelayMode::InUse,
                max_power_watts: power,
                in_use_slots: vec![slot],
                not_in_use_slots: Vec::new(),
                cohort_name: format!("rotating-{relay}"),
            },
        );
    }
    config
}

/// What the meters would actually read: generation is fixed, and `here`
/// reflects the real load of whichever relays are currently on.
fn meter_sample(config: &Config, state: RelayState, t: chrono::DateTime<Utc>) -> PowerUseSample {
    let here: f32 = state.iter_set().filter_map(|r| config.relay(r)).map(|rc| rc.max_power_watts as f32).sum();
    PowerUseSample { power_use: PowerUse { generated: 1000.0, here, neighbour: 0.0 }, t0: t, t1: t }
}

#[test]
fn exactly_one_relay_serves_at_a_time_and_cedes_after_its_cycle() {
    let config = rotating_config();
    let mut history = InMemoryHistory::new();
    let mut logger = NullLogger;

    // Tick 0: nothing on yet; the engine picks one relay to serve.
    let t0 = epoch_plus_secs(0);
    let state0 = hydro_core::assess(&config, RelayState::empty(), &history, meter_sample(&config, RelayState::empty(), t0), t0, chrono_tz::UTC, &mut logger);
    assert_eq!(state0.count(), 1, "exactly one relay should be chosen when supply is scarce");
    record_state(&mut history, &state0, t0);
    history.commit().unwrap();

    // Tick 1: past cycle_duration (60s), with meters settled. The relay
    // that has been serving cedes; the engine sheds it in this same tick.
    let t1 = epoch_plus_secs(70);
    let state1 = hydro_core::assess(&config, state0, &history, meter_sample(&config, state0, t1), t1, chrono_tz::UTC, &mut logger);
    assert_eq!(state1.count(), 0, "the serving relay must shed once its cycle window has elapsed");
    record_state(&mut history, &state1, t1);
    history.commit().unwrap();

    // Tick 2: meters now settled on the reduced (zero) load. A different
    // relay — the one with the least accumulated runtime — takes over.
    let t2 = epoch_plus_secs(75);
    let state2 = hydro_core::assess(&config, state1, &history, meter_sample(&config, state1, t2), t2, chrono_tz::UTC, &mut logger);
    assert_eq!(state2.count(), 1, "a successor relay should take over once power is available again");
    assert_ne!(state2.bits(), state0.bits(), "the successor must not be the relay that just ceded");
}
