//! HTTP surface of the monitor daemon.
//!
//! One log line per heartbeat, pass or fail:
//! `heartbeat: node=<id> verified=<bool> [reason=<tag>]`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use weft_common::{now_secs, ErrorBody, HeartbeatPayload, MonitorConfig};
use weft_store::registry::LIVE_WINDOW_SECS;
use weft_store::{RegistryRow, RegistryStore};

use crate::verify::verify_heartbeat;

/// Shared monitor state.
pub struct MonitorState {
    pub cfg: MonitorConfig,
    pub registry: Arc<dyn RegistryStore>,
    /// The monitor's own parent public key, base64 — the verification
    /// fallback for heartbeats that omit `parent_pub_b64`.
    pub parent_pub_b64: String,
}

async fn heartbeat_handler(
    State(state): State<Arc<MonitorState>>,
    body: Result<Json<HeartbeatPayload>, JsonRejection>,
) -> Response {
    let Json(hb) = match body {
        Ok(b) => b,
        Err(_) => {
            info!("heartbeat: node=<unknown> verified=false reason=bad_json");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::tag("bad_heartbeat_json")),
            )
                .into_response();
        }
    };

    let att = match verify_heartbeat(&state.parent_pub_b64, &hb) {
        Ok(att) => att,
        Err(reject) => {
            let tag = reject.tag();
            info!("heartbeat: node={} verified=false reason={}", hb.node_id, tag);
            return (StatusCode::BAD_REQUEST, Json(ErrorBody::tag(tag))).into_response();
        }
    };

    let now = now_secs();
    let attestation: Value = serde_json::from_str(hb.attestation.get())
        .unwrap_or_else(|_| Value::String(hb.attestation.get().to_string()));
    let row = RegistryRow {
        node_id: hb.node_id.clone(),
        dag_type: hb.dag_type.clone(),
        address: hb.address.clone(),
        status: hb.status.clone(),
        node_pub_key: hb.node_pub_key.clone(),
        parent_pub_b64: hb.parent_pub_b64.clone(),
        attestation,
        attestation_hash: hb.attestation_hash.clone(),
        attestation_verified_at: now,
        attestation_counter: att.counter,
        last_seen: now,
    };
    if let Err(e) = state.registry.upsert_heartbeat(row) {
        error!("heartbeat: node={} verified=false reason=db_upsert_failed: {e}", hb.node_id);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::tag("db_upsert_failed")),
        )
            .into_response();
    }

    info!("heartbeat: node={} verified=true", hb.node_id);
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "attestation_hash": hb.attestation_hash,
            "node_pub_key": hb.node_pub_key,
        })),
    )
        .into_response()
}

async fn nodes_handler(State(state): State<Arc<MonitorState>>) -> Response {
    match state.registry.recent(now_secs(), LIVE_WINDOW_SECS) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!("nodes: registry query failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::tag("db_query_failed")),
            )
                .into_response()
        }
    }
}

/// GET /health response.
#[derive(Debug, Serialize)]
struct HealthResp {
    status: &'static str,
    role: &'static str,
    node: String,
}

async fn health_handler(State(state): State<Arc<MonitorState>>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        role: "monitor",
        node: state.cfg.node_id.clone(),
    })
}

pub fn build_router(state: Arc<MonitorState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/heartbeat", post(heartbeat_handler))
        .route("/nodes", get(nodes_handler))
        .with_state(state)
}
