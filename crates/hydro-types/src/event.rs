// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single relay on/off transition. Events for a given relay are strictly
/// time-ordered within the history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub relay: u8,
    pub time: DateTime<Utc>,
    pub on: bool,
}

impl Event {
    pub fn new(relay: u8, time: DateTime<Utc>, on: bool) -> Self {
        Self { relay, time, on }
    }
}
