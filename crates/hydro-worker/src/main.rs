// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! The worker binary: the heartbeat loop of spec §5. Every tick it reads
//! the relay board's believed state, polls the meters, hands both plus the
//! schedule and history to [`hydro_core::assess`], applies the resulting
//! state back to the board, and records the transition to history. A
//! separate, read-only snapshot endpoint lets observers see the last
//! applied [`hydro_shared::Update`] without touching the control loop.

mod config;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bevy_app::{App, AppExit, ScheduleRunnerPlugin, Startup, TaskPoolPlugin, Update as UpdateSchedule};
use bevy_ecs::prelude::*;
use chrono::Utc;
use chrono_tz::Tz;
use hydro_adapters::{
    HttpMeterReader, MeterReader, RelayController, TcpRelayController, UnconfiguredRelayController,
};
use hydro_core::history::FileHistory;
use hydro_core::logging::TracingLogger;
use hydro_types::Config;
use parking_lot::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{load_config_with_fallback, AppConfig, MeterReaderConfig, RelayControllerConfig};
use snapshot::SnapshotState;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const RECENT_TRANSITIONS_LIMIT: usize = 20;

fn print_usage() {
    println!(
        "hydro-worker {VERSION}\n\n\
         Usage: hydro-worker [OPTIONS]\n\n\
         Options:\n\
         \x20 --config <PATH>    Worker config TOML (default: hydro.toml)\n\
         \x20 --schedule <PATH>  Schedule file, overrides the config's schedule_path\n\
         \x20 --once             Run a single tick and exit\n\
         \x20 -v, --version      Print the version and exit\n\
         \x20 -h, --help         Print this help and exit"
    );
}

struct Cli {
    config_path: PathBuf,
    schedule_override: Option<PathBuf>,
    once: bool,
}

fn parse_cli(args: impl Iterator<Item = String>) -> Result<Option<Cli>> {
    let mut config_path = PathBuf::from("hydro.toml");
    let mut schedule_override = None;
    let mut once = false;

    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = PathBuf::from(args.next().context("--config requires a path")?);
            }
            "--schedule" => {
                schedule_override = Some(PathBuf::from(args.next().context("--schedule requires a path")?));
            }
            "--once" => once = true,
            "-v" | "--version" => {
                println!("hydro-worker {VERSION}");
                return Ok(None);
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            other => anyhow::bail!("unrecognised argument: {other}"),
        }
    }

    Ok(Some(Cli { config_path, schedule_override, once }))
}

/// Shared, hot-reloadable schedule state: the config-watch system swaps
/// this atomically (spec §5: "the worker watches for changes and swaps
/// `Config` atomically") without the heartbeat loop noticing mid-tick.
#[derive(Resource)]
struct ScheduleState {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
    last_modified: Option<std::time::SystemTime>,
}

#[derive(Resource)]
struct Tunables {
    tz: Tz,
    refresh: Duration,
    once: bool,
}

#[derive(Resource)]
struct Adapters {
    relay_controller: Arc<dyn RelayController>,
    meter_reader: Arc<dyn MeterReader>,
}

#[derive(Resource)]
struct History {
    store: FileHistory,
}

#[derive(Resource)]
struct TokioHandle(tokio::runtime::Handle);

#[derive(Resource, Default)]
struct RunFlag(bool);

fn build_relay_controller(cfg: &RelayControllerConfig) -> Arc<dyn RelayController> {
    match cfg {
        RelayControllerConfig::None => Arc::new(UnconfiguredRelayController),
        RelayControllerConfig::Tcp { addr, timeout_ms } => {
            Arc::new(TcpRelayController::new(addr.clone(), Duration::from_millis(*timeout_ms)))
        }
    }
}

/// Returns an absent sample forever; used when no meter endpoint is
/// configured so the engine's meter-readiness gate (spec §4.5.5) simply
/// never opens, rather than the worker needing a dedicated "no meters"
/// code path.
struct AbsentMeterReader;

#[async_trait::async_trait]
impl MeterReader for AbsentMeterReader {
    async fn read_meters(&self, _deadline: Duration) -> hydro_types::PowerUseSample {
        hydro_types::PowerUseSample::absent()
    }
}

fn build_meter_reader(cfg: &MeterReaderConfig) -> Result<Arc<dyn MeterReader>> {
    Ok(match cfg {
        MeterReaderConfig::None => Arc::new(AbsentMeterReader) as Arc<dyn MeterReader>,
        MeterReaderConfig::Http { url } => Arc::new(HttpMeterReader::new(url.clone())?),
    })
}

fn load_schedule(path: &std::path::Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading schedule {}", path.display()))?;
    hydro_core::scheduling::parse(&text).map_err(|e| anyhow::anyhow!("parsing schedule {}: {e:?}", path.display()))
}

fn on_startup() {
    info!("hydro-worker starting");
}

/// Re-reads the schedule file if its mtime has advanced.
fn reload_schedule_if_changed(mut state: ResMut<ScheduleState>) {
    let metadata = match std::fs::metadata(&state.path) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %state.path.display(), error = %e, "could not stat schedule file");
            return;
        }
    };
    let modified = metadata.modified().ok();
    if modified.is_some() && modified == state.last_modified {
        return;
    }
    match load_schedule(&state.path) {
        Ok(new_config) => {
            *state.config.write() = new_config;
            state.last_modified = modified;
            info!(path = %state.path.display(), "schedule reloaded");
        }
        Err(e) => {
            warn!(path = %state.path.display(), error = %e, "schedule reload failed, keeping previous config");
        }
    }
}

/// The heartbeat tick (spec §5): read state, poll meters, assess, apply,
/// record. The `assess` call itself is wrapped in `catch_unwind` so a
/// panic in the pure decision engine cannot take the whole worker down
/// (spec §10.3) — everything around it (I/O) is allowed to propagate
/// normally since it is already behind explicit `Result` handling.
fn tick(
    adapters: Res<Adapters>,
    schedule: Res<ScheduleState>,
    tunables: Res<Tunables>,
    mut history: ResMut<History>,
    mut run_flag: ResMut<RunFlag>,
    runtime: Res<TokioHandle>,
) {
    let config = schedule.config.read().clone();
    let tz = tunables.tz;
    let refresh = tunables.refresh;

    let relay_controller = adapters.relay_controller.clone();
    let meter_reader = adapters.meter_reader.clone();

    let io_result = runtime.0.block_on(async {
        let current_state = relay_controller.get_relays().await?;
        let sample = meter_reader.read_meters(refresh).await;
        Ok::<_, hydro_types::HydroError>((current_state, sample))
    });

    let (current_state, sample) = match io_result {
        Ok(pair) => pair,
        Err(hydro_types::HydroError::NoRelayController) => {
            warn!("no relay controller configured, skipping tick");
            return;
        }
        Err(e) => {
            warn!(error = %e, "failed to read relay board, skipping tick");
            return;
        }
    };

    let assess_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut logger = TracingLogger;
        let now = Utc::now();
        hydro_core::assess(&config, current_state, &history.store, sample, now, tz, &mut logger)
    }));

    let next_state = match assess_result {
        Ok(state) => state,
        Err(_) => {
            error!("engine panicked during assess, skipping this tick's application");
            return;
        }
    };

    if next_state != current_state {
        if let Err(e) = runtime.0.block_on(relay_controller.set_relays(next_state)) {
            error!(error = %e, "failed to apply relay decision, history not updated");
            return;
        }
        let now = Utc::now();
        hydro_core::history::record_state(&mut history.store, &next_state, now);
        if let Err(e) = history.store.commit() {
            error!(error = %e, "failed to commit history");
        }
    }

    if tunables.once {
        run_flag.0 = true;
    }
}

/// Publishes the applied state to the snapshot endpoint after every tick,
/// independent of whether the state actually changed — observers can
/// still distinguish "unchanged" from "stale" by the `since` timestamps.
fn publish_snapshot(history: Res<History>, adapters: Res<Adapters>, runtime: Res<TokioHandle>, snapshot: Res<SnapshotResource>) {
    let state = runtime.0.block_on(adapters.relay_controller.get_relays());
    let Ok(state) = state else { return };
    let update = hydro_shared::Update::new(state, |relay| history.store.latest_change(relay))
        .with_recent_transitions(history.store.reverse_iter().take(RECENT_TRANSITIONS_LIMIT));
    snapshot.0.publish(update);
}

#[derive(Resource)]
struct SnapshotResource(SnapshotState);

fn maybe_exit(run_flag: Res<RunFlag>, mut exit: EventWriter<AppExit>) {
    if run_flag.0 {
        exit.write(AppExit::Success);
    }
}

fn main() -> Result<()> {
    let cli = match parse_cli(std::env::args().skip(1)) {
        Ok(Some(cli)) => cli,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("error: {e}");
            print_usage();
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut app_config: AppConfig = load_config_with_fallback(&cli.config_path)?;
    if let Some(schedule) = cli.schedule_override {
        app_config.schedule_path = schedule;
    }

    let tz: Tz = app_config
        .timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown time zone: {}", app_config.timezone))?;
    let initial_config = load_schedule(&app_config.schedule_path)?;
    let earliest = Utc::now() - chrono::Duration::from_std(app_config.retention())?;
    let history_store = FileHistory::open(&app_config.history_path, earliest)?;

    let relay_controller = build_relay_controller(&app_config.relay_controller);
    let meter_reader = build_meter_reader(&app_config.meter_reader)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let handle = runtime.handle().clone();

    let snapshot_addr = app_config.snapshot_addr.clone();
    let snapshot_state = SnapshotState::default();
    let snapshot_state_for_server = snapshot_state.clone();
    runtime.spawn(async move {
        if let Err(e) = snapshot::serve(&snapshot_addr, snapshot_state_for_server).await {
            error!(error = %e, "snapshot endpoint exited");
        }
    });

    let heartbeat = app_config.heartbeat();
    let once = cli.once;

    let mut app = App::new();
    app.add_plugins(TaskPoolPlugin::default());
    app.add_plugins(ScheduleRunnerPlugin::run_loop(heartbeat));
    app.insert_resource(TokioHandle(handle));
    app.insert_resource(Adapters { relay_controller, meter_reader });
    app.insert_resource(ScheduleState {
        config: Arc::new(RwLock::new(initial_config)),
        path: app_config.schedule_path.clone(),
        last_modified: std::fs::metadata(&app_config.schedule_path).ok().and_then(|m| m.modified().ok()),
    });
    app.insert_resource(Tunables { tz, refresh: app_config.refresh_duration(), once });
    app.insert_resource(History { store: history_store });
    app.insert_resource(RunFlag::default());
    app.insert_resource(SnapshotResource(snapshot_state));

    app.add_systems(Startup, on_startup);
    app.add_systems(UpdateSchedule, (reload_schedule_if_changed, tick, publish_snapshot, maybe_exit).chain());

    // The runtime outlives `app.run()` only via the resources captured
    // above; keep it alive here so spawned tasks (the snapshot server)
    // are not dropped when `main` exits early on `--once`.
    app.run();
    drop(runtime);

    Ok(())
}
