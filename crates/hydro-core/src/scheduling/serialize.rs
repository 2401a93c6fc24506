// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Serializes a [`Config`] back into schedule-grammar text, the dual of
//! [`super::grammar::parse`]. Always emits the canonical long form (`is`,
//! full cohort names, no short labels) — per spec's own open question
//! about `is`/`are` normalisation, reserialisation standardises rather
//! than trying to preserve the original author's phrasing.

use std::collections::HashMap;
use std::time::Duration;

use hydro_types::{Config, RelayMode, Slot, SlotKind};

struct Group {
    mode: RelayMode,
    in_use_slots: Vec<Slot>,
    relays: Vec<u8>,
}

pub fn to_schedule_text(config: &Config) -> String {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for (relay, rc) in config.configured_relays() {
        let group = groups.entry(rc.cohort_name.clone()).or_insert_with(|| {
            order.push(rc.cohort_name.clone());
            Group { mode: rc.mode, in_use_slots: rc.in_use_slots.clone(), relays: Vec::new() }
        });
        group.relays.push(relay);
    }

    let mut out = String::new();
    for name in &order {
        let group = &groups[name];
        out.push_str(&relay_list_clause(&group.relays));
        out.push_str(if group.relays.len() == 1 { " is " } else { " are " });
        out.push_str(name);
        out.push_str(".\n");
    }
    out.push('\n');

    for name in &order {
        for &relay in &groups[name].relays {
            if let Some(rc) = config.relay(relay) {
                if rc.max_power_watts > 0 {
                    out.push_str(&format!("relay {relay} has max power {}w.\n", rc.max_power_watts));
                }
            }
        }
    }
    out.push('\n');

    for name in &order {
        let group = &groups[name];
        match group.mode {
            RelayMode::AlwaysOn => out.push_str(&format!("{name} is on.\n")),
            RelayMode::InUse => {
                for slot in &group.in_use_slots {
                    out.push_str(&slot_clause(name, slot));
                    out.push('\n');
                }
            }
            RelayMode::AlwaysOff | RelayMode::NotInUse => {}
        }
    }

    out
}

fn relay_list_clause(relays: &[u8]) -> String {
    if relays.len() == 1 {
        format!("relay {}", relays[0])
    } else {
        let parts: Vec<String> = relays.iter().map(u8::to_string).collect();
        format!("relays {}", parts.join(", "))
    }
}

fn slot_clause(name: &str, slot: &Slot) -> String {
    let full_day = slot.start == slot.end;
    let mut s = format!("{name} on");
    if !full_day {
        s.push_str(&format!(" from {} to {}", slot.start, slot.end));
    }
    match slot.kind {
        SlotKind::Continuous => {}
        SlotKind::Exactly => s.push_str(&format!(" for {}", format_duration(slot.duration))),
        SlotKind::AtLeast => s.push_str(&format!(" for at least {}", format_duration(slot.duration))),
        SlotKind::AtMost => s.push_str(&format!(" for at most {}", format_duration(slot.duration))),
    }
    s.push('.');
    s
}

fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    let h = secs / 3600;
    secs %= 3600;
    let m = secs / 60;
    secs %= 60;

    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{h}h"));
    }
    if m > 0 {
        out.push_str(&format!("{m}m"));
    }
    if secs > 0 || out.is_empty() {
        out.push_str(&format!("{secs}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::grammar::parse;
    use super::*;

    #[test]
    fn reference_schedule_round_trips() {
        let text = "relay 6 is dining room\n\
                     relays 0, 4, 5 are bedrooms\n\
                     relay 4 has max power 300w\n\
                     relays 0, 7, 8 have max power 5kw\n\
                     \n\
                     dining room on from 14:30 to 20:45 for at least 20m\n\
                     bedrooms on from 17:00 to 20:00\n";
        let config = parse(text).unwrap();
        let serialized = to_schedule_text(&config);
        let reparsed = parse(&serialized).expect("serialized schedule must reparse");
        assert_eq!(config, reparsed);
    }

    #[test]
    fn always_on_cohort_round_trips() {
        let text = "relay 0 is pump\npump is on\n";
        let config = parse(text).unwrap();
        let reparsed = parse(&to_schedule_text(&config)).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn always_off_cohort_with_no_slots_round_trips() {
        let text = "relay 0 is spare\n";
        let config = parse(text).unwrap();
        let reparsed = parse(&to_schedule_text(&config)).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn duration_formatting_is_canonical() {
        assert_eq!(format_duration(Duration::from_secs(20 * 60)), "20m");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 30 * 60)), "2h30m");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
