// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Scenario: two discretionary relays both on, with `generated=1000,
//! here=3000, neighbour=1500` — well into grid import. The engine must
//! shed at least one relay in a single pass (lowest priority first)
//! rather than leaving the household drawing from the grid.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use hydro_core::history::InMemoryHistory;
use hydro_core::logging::CapturingLogger;
use hydro_types::{Config, Event, PowerUse, PowerUseSample, RelayConfig, RelayMode, RelayState, Slot, SlotKind, TimeOfDay};
use std::time::Duration;

fn epoch_plus_hours(h: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(h)
}

#[test]
fn importing_power_sheds_at_least_one_discretionary_relay() {
    let mut config = Config::new();
    let all_day_at_most = Slot::new(TimeOfDay::MIDNIGHT, TimeOfDay::MIDNIGHT, SlotKind::AtMost, Duration::from_secs(20 * 3600));
    for relay in [0u8, 1u8] {
        config.set_relay(
            relay,
            RelayConfig {
                mode: RelayMode::InUse,
                max_power_watts: 2000,
                in_use_slots: vec![all_day_at_most],
                not_in_use_slots: Vec::new(),
                cohort_name: format!("load-{relay}"),
            },
        );
    }

    let t0 = epoch_plus_hours(10);
    let history = InMemoryHistory::with_events(vec![
        Event::new(0, t0 - ChronoDuration::hours(1), true),
        Event::new(1, t0 - ChronoDuration::hours(1), true),
    ]);

    let both_on = RelayState::empty().with_bit_set(0).with_bit_set(1);
    let sample = PowerUseSample {
        power_use: PowerUse { generated: 1000.0, here: 3000.0, neighbour: 1500.0 },
        t0,
        t1: t0,
    };
    let mut logger = CapturingLogger::new();

    let next = hydro_core::assess(&config, both_on, &history, sample, t0, chrono_tz::UTC, &mut logger);

    assert!(next.count() < both_on.count(), "importing power must shed at least one relay");
    assert!(logger.contains("shed"), "engine should log a shed reason");

    // Neither relay alone frees the 2500W of regain this import calls for
    // (each is only 2000W), so the single pass sheds both, lowest-priority
    // (higher relay number) first per spec §4.5.6's stable tiebreak.
    assert_eq!(next.count(), 0, "both 2000W relays must shed to clear a 2500W regain target");
}
