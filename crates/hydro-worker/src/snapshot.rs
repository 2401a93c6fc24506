// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! A read-only HTTP view of the worker's last applied [`Update`]
//! (spec §5: "a separately synchronised view for diagnostics"). Entirely
//! decoupled from the control loop: it only ever reads the latest snapshot
//! another task published, never touches the relay board or history store.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use hydro_shared::Update;
use parking_lot::RwLock;
use tower_http::cors::CorsLayer;

/// Shared slot the heartbeat loop publishes into after each applied
/// decision; `None` until the first tick completes.
#[derive(Clone, Default)]
pub struct SnapshotState {
    inner: Arc<RwLock<Option<Update>>>,
}

impl SnapshotState {
    pub fn publish(&self, update: Update) {
        *self.inner.write() = Some(update);
    }
}

async fn get_snapshot(State(state): State<SnapshotState>) -> Json<Option<Update>> {
    Json(state.inner.read().clone())
}

/// Serves the snapshot endpoint on `addr` until the process exits. Binding
/// failure (e.g. the address is already in use) is reported but does not
/// take down the control loop, which runs independently.
pub async fn serve(addr: &str, state: SnapshotState) -> anyhow::Result<()> {
    // Permissive CORS: this is a read-only diagnostics view meant to be
    // fetched from a browser-based dashboard on another origin.
    let app =
        Router::new().route("/snapshot", get(get_snapshot)).layer(CorsLayer::permissive()).with_state(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "snapshot endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
