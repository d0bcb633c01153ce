//! HTTP status endpoint — exposes the membership view as JSON.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use census_core::identity::display_id;
use census_core::wire::Protocol;
use census_services::{interval_for, NodeRegistry};

#[derive(Clone)]
pub struct StatusState {
    pub registry: NodeRegistry,
    pub node_id: String,
    pub protocol: Protocol,
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub protocol: String,
    pub peers: usize,
    pub interval_secs: u64,
}

async fn handle_status(State(state): State<StatusState>) -> Json<StatusResponse> {
    // one read, so interval_secs always matches peers
    let peers = state.registry.node_count().get();
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        protocol: state.protocol.to_string(),
        peers,
        interval_secs: interval_for(peers).as_secs(),
    })
}

// ── /peers ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerInfo {
    pub node_id: String,
    pub last_seen_secs: u64,
}

async fn handle_peers(State(state): State<StatusState>) -> Json<PeersResponse> {
    let peers = state
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|p| PeerInfo {
            node_id: display_id(&p.node_id),
            last_seen_secs: p.last_seen.as_secs(),
        })
        .collect();

    Json(PeersResponse { peers })
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/peers", get(handle_peers))
        .with_state(state)
}

pub async fn serve(
    state: StatusState,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "status endpoint listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
