// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The consumed interfaces of spec §6: [`RelayController`] (the relay
//! board the worker drives) and [`MeterReader`] (the electricity meters
//! the worker polls). Both are traits so the worker can swap a real
//! implementation for an in-memory test double without touching the
//! heartbeat loop.
//!
//! The wire-shaped implementations here ([`TcpRelayController`],
//! [`HttpMeterReader`]) show the intended shape of the real protocols;
//! neither is a full vendor protocol implementation, which spec.md places
//! out of scope.

pub mod meter;
pub mod relay;

pub use meter::{HttpMeterReader, InMemoryMeterReader, MeterReader};
pub use relay::{InMemoryRelayController, RelayController, TcpRelayController, UnconfiguredRelayController};
