// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The schedule grammar: parses cohort declarations, max-power
//! assignments, slot rules, and `config` tunable overrides into a
//! [`hydro_types::Config`], and serializes one back to text.

mod grammar;
mod serialize;

pub use grammar::{parse, parse_duration, parse_power_watts};
pub use serialize::to_schedule_text;
