// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The control-plane core: schedule parsing, the append-only history
//! store, power accounting, and the `Assess` decision engine (spec §4).
//!
//! This crate depends only on [`hydro_types`] for its data model; it talks
//! to the outside world through the traits in `history` and the pluggable
//! [`logging::Logger`] — no I/O of its own.

pub mod engine;
pub mod history;
pub mod logging;
pub mod scheduling;

pub use engine::assess;
