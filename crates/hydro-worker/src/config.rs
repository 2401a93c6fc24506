// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The worker's own TOML configuration (spec §10.4's `AppConfig`): where to
//! find the schedule file and history log, how to reach the relay board
//! and meters, and the worker-level timing constants that sit outside the
//! engine's own tunables (spec §4.5.9 tunables live in the schedule file
//! itself, not here).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

fn default_heartbeat_ms() -> u64 {
    1_000
}

fn default_refresh_secs() -> u64 {
    30
}

fn default_retention_hours() -> u64 {
    24
}

fn default_snapshot_addr() -> String {
    "127.0.0.1:8099".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Top-level worker configuration, loaded from a TOML file (default
/// `hydro.toml`) per spec §10.4.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the schedule-grammar file (spec §4.2/§6).
    pub schedule_path: PathBuf,

    /// Path to the append-only history log (spec §6).
    pub history_path: PathBuf,

    /// How often the heartbeat loop ticks (spec §4.5.9 default: 1s).
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// How long a stale relay-board read may be trusted before the worker
    /// treats its belief about current state as unusable (spec §7).
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,

    /// How much history tail is kept on load (spec §3 Lifecycle: at least 24h).
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// IANA time zone used to resolve slot occupancy (spec §4.1).
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Address the read-only snapshot endpoint binds to (spec §5's
    /// "separately synchronised view").
    #[serde(default = "default_snapshot_addr")]
    pub snapshot_addr: String,

    #[serde(default)]
    pub relay_controller: RelayControllerConfig,

    #[serde(default)]
    pub meter_reader: MeterReaderConfig,
}

impl AppConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn refresh_duration(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

/// How the worker reaches the relay board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayControllerConfig {
    /// No board configured: the worker logs and retries, never invoking
    /// the engine (spec §7's "No relay controller" condition).
    None,
    Tcp { addr: String, #[serde(default = "default_io_timeout_ms")] timeout_ms: u64 },
}

impl Default for RelayControllerConfig {
    fn default() -> Self {
        Self::None
    }
}

/// How the worker reaches the electricity meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeterReaderConfig {
    /// No meters configured: every tick observes an absent sample.
    None,
    Http { url: String },
}

impl Default for MeterReaderConfig {
    fn default() -> Self {
        Self::None
    }
}

fn default_io_timeout_ms() -> u64 {
    800
}

/// Loads `AppConfig` from `path`, falling back to an all-`None`-adapters
/// configuration rooted at `./hydro.toml`/`./history.log` if the file does
/// not exist yet — matching the teacher's `load_config_with_fallback`
/// contract of never hard-failing worker startup on a missing config file.
pub fn load_config_with_fallback(path: &std::path::Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no worker config found, starting with adapters unconfigured");
        return Ok(AppConfig {
            schedule_path: PathBuf::from("hydro-schedule.txt"),
            history_path: PathBuf::from("history.log"),
            heartbeat_ms: default_heartbeat_ms(),
            refresh_secs: default_refresh_secs(),
            retention_hours: default_retention_hours(),
            timezone: default_timezone(),
            snapshot_addr: default_snapshot_addr(),
            relay_controller: RelayControllerConfig::None,
            meter_reader: MeterReaderConfig::None,
        });
    }

    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: AppConfig = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
