// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Simultaneous generation and consumption readings, in watts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerUse {
    pub generated: f32,
    pub here: f32,
    pub neighbour: f32,
}

/// Per-party decomposition of a [`PowerUse`] into billable export and
/// import components, all in watts and all non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerChargeable {
    pub export_grid: f32,
    pub export_neighbour: f32,
    pub export_here: f32,
    pub import_neighbour: f32,
    pub import_here: f32,
}

impl PowerUse {
    /// Decompose this reading into chargeable export/import components.
    ///
    /// When generation covers both parties' usage, everything is exported
    /// (any surplus goes to the grid). Otherwise the deficit is imported,
    /// split so that whichever party is consuming more than half of
    /// generation absorbs the shortfall first; if both exceed half, the
    /// import is split proportionally to consumption.
    pub fn chargeable(&self) -> PowerChargeable {
        let imported = (self.here + self.neighbour) - self.generated;

        if imported <= 0.0 {
            return PowerChargeable {
                export_here: self.here,
                export_neighbour: self.neighbour,
                export_grid: self.generated - self.here - self.neighbour,
                import_neighbour: 0.0,
                import_here: 0.0,
            };
        }

        let half = self.generated / 2.0;
        let here_over = self.here > half;
        let neighbour_over = self.neighbour > half;

        if here_over && neighbour_over {
            let total = self.here + self.neighbour;
            PowerChargeable {
                export_here: half,
                export_neighbour: half,
                export_grid: 0.0,
                import_neighbour: imported * self.neighbour / total,
                import_here: imported * self.here / total,
            }
        } else if neighbour_over {
            PowerChargeable {
                export_here: self.here,
                export_neighbour: self.generated - self.here,
                export_grid: 0.0,
                import_neighbour: imported,
                import_here: 0.0,
            }
        } else {
            // `here` alone exceeds half (or, if neither does, the choice is
            // arbitrary since both consume <= half and the sum still
            // exceeds generation only by floating-point slack); symmetric
            // with the `neighbour_over` branch above.
            PowerChargeable {
                export_neighbour: self.neighbour,
                export_here: self.generated - self.neighbour,
                export_grid: 0.0,
                import_here: imported,
                import_neighbour: 0.0,
            }
        }
    }
}

/// A [`PowerUse`] reading bracketed by the time window over which it was
/// gathered. `t0` equal to the Unix epoch is the sentinel for "no meter
/// reading available" (see `PowerUseSample::is_present`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerUseSample {
    pub power_use: PowerUse,
    pub t0: DateTime<Utc>,
    pub t1: DateTime<Utc>,
}

impl PowerUseSample {
    /// The sentinel timestamp meaning "meters absent".
    pub fn absent() -> Self {
        Self {
            power_use: PowerUse::default(),
            t0: DateTime::<Utc>::UNIX_EPOCH,
            t1: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn is_present(&self) -> bool {
        self.t0 != DateTime::<Utc>::UNIX_EPOCH
    }
}
