// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Scenario: an `Exactly` 2h slot from 01:00-05:00. Walking the clock hour
//! by hour through a full day (and into the next day's occurrence)
//! reproduces the on/off sequence from spec.md's scenario table. Meters
//! report ample, settled generation throughout so the engine's
//! discretionary turn-on phase (not just the absolute must-run fallback)
//! is free to act as soon as the slot opens.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use hydro_core::history::{record_state, HistoryStore, InMemoryHistory};
use hydro_core::logging::NullLogger;
use hydro_types::{Config, PowerUse, PowerUseSample, RelayConfig, RelayMode, RelayState, Slot, SlotKind, TimeOfDay};
use std::time::Duration;

fn epoch_plus_hours(h: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(h)
}

fn config_with_2h_slot() -> Config {
    let slot = Slot::new(
        TimeOfDay::from_hms(1, 0, 0).unwrap(),
        TimeOfDay::from_hms(5, 0, 0).unwrap(),
        SlotKind::Exactly,
        Duration::from_secs(2 * 3600),
    );
    let mut config = Config::new();
    config.set_relay(
        0,
        RelayConfig {
            mode: RelayMode::InUse,
            max_power_watts: 500,
            in_use_slots: vec![slot],
            not_in_use_slots: Vec::new(),
            cohort_name: "pump".to_string(),
        },
    );
    config
}

fn ample_settled_sample(t: chrono::DateTime<Utc>) -> PowerUseSample {
    PowerUseSample { power_use: PowerUse { generated: 5000.0, here: 0.0, neighbour: 0.0 }, t0: t, t1: t }
}

#[test]
fn exactly_slot_reproduces_the_scenario_table_sequence() {
    let config = config_with_2h_slot();
    let mut history = InMemoryHistory::new();
    let mut logger = NullLogger;
    let mut state = RelayState::empty();

    let expected: &[(i64, bool)] =
        &[(0, false), (1, true), (2, true), (3, false), (24, false), (25, true), (27, false)];

    for &(hour, expected_on) in expected {
        let now = epoch_plus_hours(hour);
        state = hydro_core::assess(&config, state, &history, ample_settled_sample(now), now, chrono_tz::UTC, &mut logger);
        record_state(&mut history, &state, now);
        history.commit().unwrap();
        assert_eq!(state.is_set(0), expected_on, "relay 0 at T({hour}) should be {expected_on}");
    }
}
