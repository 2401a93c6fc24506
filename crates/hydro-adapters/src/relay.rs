// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The relay-controller interface consumed by the worker (spec §6):
//! `set_relays`/`get_relays`, both fallible and retried by the caller.

use async_trait::async_trait;
use hydro_types::{HydroError, RelayState};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// The relay board the worker drives. Implementations may fail; the worker
/// retries with its own backoff (spec §5/§7), and a missing controller is a
/// distinguished condition ([`HydroError::NoRelayController`]) rather than
/// an ordinary I/O error.
#[async_trait]
pub trait RelayController: Send + Sync {
    /// Push a new relay state to the board.
    async fn set_relays(&self, state: RelayState) -> Result<(), HydroError>;

    /// Read the board's believed current state.
    async fn get_relays(&self) -> Result<RelayState, HydroError>;
}

/// In-memory test double. Can be told to fail the next N calls, to exercise
/// the worker's retry/backoff behaviour without a real board.
#[derive(Debug, Default)]
pub struct InMemoryRelayController {
    state: Mutex<RelayState>,
    fail_next_set: Mutex<u32>,
    fail_next_get: Mutex<u32>,
}

impl InMemoryRelayController {
    pub fn new(initial: RelayState) -> Self {
        Self { state: Mutex::new(initial), fail_next_set: Mutex::new(0), fail_next_get: Mutex::new(0) }
    }

    pub fn fail_next_set(&self, count: u32) {
        *self.fail_next_set.lock() = count;
    }

    pub fn fail_next_get(&self, count: u32) {
        *self.fail_next_get.lock() = count;
    }
}

#[async_trait]
impl RelayController for InMemoryRelayController {
    async fn set_relays(&self, state: RelayState) -> Result<(), HydroError> {
        let mut remaining = self.fail_next_set.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HydroError::TransientIo("simulated relay write failure".to_string()));
        }
        *self.state.lock() = state;
        Ok(())
    }

    async fn get_relays(&self) -> Result<RelayState, HydroError> {
        let mut remaining = self.fail_next_get.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HydroError::TransientIo("simulated relay read failure".to_string()));
        }
        Ok(*self.state.lock())
    }
}

/// Wire shape for a TCP-connected relay board: one connection per call, a
/// one-byte command (`0x01` = set, `0x02` = get) followed by the 4-byte
/// little-endian bitset for `set`, and a 4-byte little-endian bitset
/// response for both. This is the shape the real driver protocol would
/// take, not a vendor-specific implementation of one (out of scope per
/// spec.md §1).
pub struct TcpRelayController {
    addr: String,
    timeout: Duration,
}

impl TcpRelayController {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), timeout }
    }

    async fn connect(&self) -> Result<TcpStream, HydroError> {
        tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| HydroError::TransientIo(format!("relay board {} connect timed out", self.addr)))?
            .map_err(|e| HydroError::TransientIo(format!("relay board {} connect failed: {e}", self.addr)))
    }
}

#[async_trait]
impl RelayController for TcpRelayController {
    async fn set_relays(&self, state: RelayState) -> Result<(), HydroError> {
        let mut stream = self.connect().await?;
        let mut frame = [0u8; 5];
        frame[0] = 0x01;
        frame[1..5].copy_from_slice(&state.bits().to_le_bytes());
        tokio::time::timeout(self.timeout, stream.write_all(&frame))
            .await
            .map_err(|_| HydroError::TransientIo("relay board write timed out".to_string()))?
            .map_err(|e| HydroError::TransientIo(format!("relay board write failed: {e}")))?;
        debug!(bits = state.bits(), "relay board: set_relays");
        Ok(())
    }

    async fn get_relays(&self) -> Result<RelayState, HydroError> {
        let mut stream = self.connect().await?;
        tokio::time::timeout(self.timeout, stream.write_all(&[0x02]))
            .await
            .map_err(|_| HydroError::TransientIo("relay board write timed out".to_string()))?
            .map_err(|e| HydroError::TransientIo(format!("relay board write failed: {e}")))?;

        let mut buf = [0u8; 4];
        tokio::time::timeout(self.timeout, stream.read_exact(&mut buf))
            .await
            .map_err(|_| HydroError::TransientIo("relay board read timed out".to_string()))?
            .map_err(|e| HydroError::TransientIo(format!("relay board read failed: {e}")))?;

        Ok(RelayState::from_bits(u32::from_le_bytes(buf)))
    }
}

/// A controller that has not been configured at all: `set_relays`/
/// `get_relays` always report the distinguished
/// [`HydroError::NoRelayController`] condition (spec §7), so the worker
/// can tell "board absent" apart from ordinary transient I/O failure and
/// keep retrying without ever invoking the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredRelayController;

#[async_trait]
impl RelayController for UnconfiguredRelayController {
    async fn set_relays(&self, _state: RelayState) -> Result<(), HydroError> {
        warn!("set_relays called with no relay controller configured");
        Err(HydroError::NoRelayController)
    }

    async fn get_relays(&self) -> Result<RelayState, HydroError> {
        Err(HydroError::NoRelayController)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_state() {
        let ctrl = InMemoryRelayController::new(RelayState::empty());
        let state = RelayState::empty().with_bit_set(3);
        ctrl.set_relays(state).await.unwrap();
        assert_eq!(ctrl.get_relays().await.unwrap(), state);
    }

    #[tokio::test]
    async fn in_memory_simulated_failures_are_consumed_once() {
        let ctrl = InMemoryRelayController::new(RelayState::empty());
        ctrl.fail_next_set(1);
        assert!(ctrl.set_relays(RelayState::empty()).await.is_err());
        assert!(ctrl.set_relays(RelayState::empty()).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_controller_reports_distinguished_error() {
        let ctrl = UnconfiguredRelayController;
        assert!(matches!(ctrl.get_relays().await, Err(HydroError::NoRelayController)));
    }
}
