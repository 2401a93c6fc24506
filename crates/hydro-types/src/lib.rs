// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Core data model for the hydro control plane: time-of-day and slot
//! primitives, the relay/cohort schedule types, transition events, and
//! the power-accounting types the decision engine reasons over.

pub mod error;
pub mod event;
pub mod power;
pub mod relay;
pub mod slot;
pub mod time;

pub use error::{HydroError, ParseError};
pub use event::Event;
pub use power::{PowerChargeable, PowerUse, PowerUseSample};
pub use relay::{
    Cohort, Config, EngineTunables, RelayConfig, RelayMode, RelayState, DEFAULT_CYCLE_DURATION,
    DEFAULT_METER_REACTION_DURATION, DEFAULT_MINIMUM_CHANGE_DURATION, MAX_RELAYS,
};
pub use slot::{Slot, SlotKind};
pub use time::TimeOfDay;
