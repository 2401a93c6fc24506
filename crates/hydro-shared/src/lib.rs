// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Small cross-crate telemetry types shared between `hydro-worker` and any
//! downstream observer (the read-only snapshot endpoint, future UI/report
//! consumers). Deliberately tiny — the bulk of the system's state lives in
//! `hydro-types`/`hydro-core`; this crate only adds the "as observed by the
//! outside world after a tick" shape.

pub mod telemetry;

pub use telemetry::{RelayStatus, Update};
