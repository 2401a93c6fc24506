// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

use std::ops::Range;

/// A single positional parse error, carrying the byte range into the
/// original schedule text it complains about so a UI can underline it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub byte_range: Range<usize>,
    pub message: String,
}

impl ParseError {
    pub fn new(byte_range: Range<usize>, message: impl Into<String>) -> Self {
        Self { byte_range, message: message.into() }
    }
}

/// Top-level error taxonomy for the control plane (spec §7).
///
/// `Assess` itself never returns this — it is infallible by design. This
/// type covers the I/O and configuration boundary around it.
#[derive(Debug, thiserror::Error)]
pub enum HydroError {
    /// One or more positional schedule-parse errors; the original text is
    /// preserved by the caller so the errors can be re-rendered against it.
    #[error("{} schedule parse error(s)", .errors.len())]
    Parse { errors: Vec<ParseError> },

    /// A meter read or relay write failed. Logged and swallowed by the
    /// worker, never propagated out of the engine.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Distinguished condition: no relay controller is configured at all.
    /// The worker keeps retrying; the engine is not invoked.
    #[error("no relay controller configured")]
    NoRelayController,

    /// A programmer error: the engine observed a state that should be
    /// impossible (e.g. an out-of-bounds relay index, or an `AlwaysOn`
    /// relay with no legal path to being turned on). These abort the
    /// process rather than being handled.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
