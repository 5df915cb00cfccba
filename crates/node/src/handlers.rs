//! HTTP surface of the node daemon.
//!
//! `POST /api/auth/sign` is the attested-event ingest path. The pipeline
//! is ordered and short-circuits on the first failure:
//!
//! 1. Hash the verbatim attestation bytes (logging, evidence, `tx_hash`).
//! 2. Decode the parent public key and child signature.
//! 3. Parse the inner attestation.
//! 4. Verify the chain over `"heartbeat:" ‖ node_id`.
//! 5. On failure: record a tamper alert and an unverified attestation
//!    row (both best-effort) and respond 401.
//! 6. On success: one ledger transaction — attestation upsert, node
//!    upsert, DAG insert (dedup on `tx_hash`), verification log, commit.
//!    Any stage failure rolls back and responds 500 with the stage tag.
//! 7. Respond 200 and trigger peer fanout asynchronously.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use weft_common::{now_secs, sha256_hex, ErrorBody, PeerAttestBody, SignRequest, SignResponse};
use weft_store::ledger::NewDagNode;
use weft_tpm::{verify_chain, Attestation, ChainVerifyError};

use crate::propagate;
use crate::state::AppState;

/// Tamper alert description used for every chain-verification failure.
const TAMPER_DESCRIPTION: &str = "tpm_verification_failed";

/// Rejection outcome of the ingest pipeline.
#[derive(Debug)]
pub enum SignReject {
    /// Malformed request field; maps to 400.
    BadRequest { tag: &'static str, details: Option<String> },
    /// Chain verification failed; maps to 401 (tamper alert recorded).
    VerifyFailed { reason: ChainVerifyError, attestation_hash: String },
    /// A ledger transaction stage failed; maps to 500 with the stage tag.
    Db { stage: &'static str },
}

impl IntoResponse for SignReject {
    fn into_response(self) -> Response {
        match self {
            SignReject::BadRequest { tag, details } => {
                let body = match details {
                    Some(d) => ErrorBody::with_details(tag, d),
                    None => ErrorBody::tag(tag),
                };
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            SignReject::VerifyFailed { reason, .. } => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::with_details(TAMPER_DESCRIPTION, reason.to_string())),
            )
                .into_response(),
            SignReject::Db { stage } => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::tag(stage))).into_response()
            }
        }
    }
}

/// Run the ingest pipeline for one submission. Pure with respect to the
/// HTTP layer, so the full path is exercisable from tests.
pub fn process_sign_request(app: &AppState, req: &SignRequest) -> Result<SignResponse, SignReject> {
    let att_bytes = req.attestation.get().as_bytes();
    let attestation_hash = sha256_hex(att_bytes);

    let parent_pub = B64.decode(&req.parent_pub_b64).map_err(|e| SignReject::BadRequest {
        tag: "bad_parent_pub",
        details: Some(e.to_string()),
    })?;
    let child_sig = B64.decode(&req.child_sig_b64).map_err(|e| SignReject::BadRequest {
        tag: "bad_child_sig",
        details: Some(e.to_string()),
    })?;
    let att: Attestation =
        serde_json::from_str(req.attestation.get()).map_err(|e| SignReject::BadRequest {
            tag: "invalid_attestation_json",
            details: Some(e.to_string()),
        })?;

    let msg = format!("heartbeat:{}", req.node_id);
    if let Err(reason) = verify_chain(&parent_pub, msg.as_bytes(), &child_sig, &att) {
        record_verification_failure(app, req, &attestation_hash, &reason);
        return Err(SignReject::VerifyFailed { reason, attestation_hash });
    }

    let now = now_secs();
    let att_value: Value = serde_json::from_str(req.attestation.get())
        .unwrap_or_else(|_| Value::String(req.attestation.get().to_string()));

    // tx_hash binds the event payload, the submitter's signature, and the
    // attestation hash it was accepted under.
    let payload_json = req.event_payload.as_deref().map(|p| p.get()).unwrap_or("{}");
    let mut hash_input = Vec::with_capacity(
        payload_json.len() + req.node_signature.len() + attestation_hash.len(),
    );
    hash_input.extend_from_slice(payload_json.as_bytes());
    hash_input.extend_from_slice(req.node_signature.as_bytes());
    hash_input.extend_from_slice(attestation_hash.as_bytes());
    let dag_tx_hash = sha256_hex(&hash_input);

    let dag_node_id = {
        let mut tx = app.store.begin().map_err(|_| SignReject::Db { stage: "db_begin" })?;
        tx.upsert_attestation(
            &req.node_id,
            &req.nonce,
            &req.child_sig_b64,
            true,
            Some(now),
            att_value.clone(),
        )
        .map_err(|_| SignReject::Db { stage: "db_attestation" })?;
        tx.upsert_node(&req.node_id, &att.child_pub_b64, now)
            .map_err(|_| SignReject::Db { stage: "db_node" })?;
        let payload: Value = serde_json::from_str(payload_json).unwrap_or_else(|_| json!({}));
        let id = tx
            .insert_dag_node(NewDagNode {
                account_id: req.account_id.clone(),
                event_type: req.event_type.clone(),
                payload,
                tx_hash: dag_tx_hash.clone(),
                parents: req.parents.clone(),
                dag_type: "auth".to_string(),
                node_id: req.node_id.clone(),
                node_signature: req.node_signature.clone(),
                created_at: now,
            })
            .map_err(|_| SignReject::Db { stage: "db_dag_insert" })?;
        tx.insert_verification_log(
            "dag_node",
            id,
            true,
            &app.cfg.node_id,
            json!({ "attestation_hash": attestation_hash, "event_type": req.event_type }),
        )
        .map_err(|_| SignReject::Db { stage: "db_verification_log" })?;
        tx.commit().map_err(|_| SignReject::Db { stage: "db_commit" })?;
        id
    };

    info!(
        node = %req.node_id,
        event = %req.event_type,
        tx_hash = %dag_tx_hash,
        dag_node_id,
        "accepted attested event"
    );
    Ok(SignResponse {
        ok: true,
        attestation_hash,
        dag_tx_hash,
        dag_node_id,
    })
}

/// Record the 401 evidence trail. Best-effort: a store failure here must
/// not change the client-facing outcome.
fn record_verification_failure(
    app: &AppState,
    req: &SignRequest,
    attestation_hash: &str,
    reason: &ChainVerifyError,
) {
    let att_value: Value = serde_json::from_str(req.attestation.get())
        .unwrap_or_else(|_| Value::String(req.attestation.get().to_string()));
    let evidence = json!({
        "att_hash": attestation_hash,
        "reason": reason.to_string(),
        "attestation": att_value,
    });
    if let Err(e) =
        app.store
            .record_tamper_alert(&req.node_id, TAMPER_DESCRIPTION, evidence, now_secs())
    {
        warn!(node = %req.node_id, error = %e, "failed to record tamper alert");
    }
    if let Err(e) =
        app.store
            .record_failed_attestation(&req.node_id, &req.nonce, &req.child_sig_b64, att_value)
    {
        warn!(node = %req.node_id, error = %e, "failed to record unverified attestation");
    }
}

async fn auth_sign_handler(
    State(app): State<Arc<AppState>>,
    body: Result<Json<SignRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rej) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::with_details("invalid_json", rej.body_text())),
            )
                .into_response();
        }
    };

    match process_sign_request(&app, &req) {
        Ok(resp) => {
            if !app.cfg.peers.is_empty() {
                let body = PeerAttestBody {
                    node_id: req.node_id.clone(),
                    attestation: req.attestation.clone(),
                    attestation_hash: resp.dag_tx_hash.clone(),
                };
                tokio::spawn(propagate::fan_out(
                    app.http.clone(),
                    app.cfg.peers.clone(),
                    body,
                ));
            }
            (StatusCode::OK, Json(resp)).into_response()
        }
        Err(reject) => {
            warn!(node = %req.node_id, ?reject, "rejected attested event");
            reject.into_response()
        }
    }
}

async fn peer_attest_handler(
    State(app): State<Arc<AppState>>,
    body: Result<Json<PeerAttestBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::with_details("invalid_json", rej.body_text())),
            )
                .into_response();
        }
    };

    // Fanout carries attestations that already passed verification on the
    // originating node; receipt is recorded best-effort.
    let details: Value = serde_json::from_str(body.attestation.get())
        .unwrap_or_else(|_| Value::String(body.attestation.get().to_string()));
    if let Err(e) = app.store.record_peer_attestation(
        &body.node_id,
        &body.attestation_hash,
        details,
        now_secs(),
    ) {
        warn!(node = %body.node_id, error = %e, "failed to record peer attestation");
    }
    info!(node = %body.node_id, hash = %body.attestation_hash, "peer attestation received");
    (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
}

/// GET /health response.
#[derive(Debug, Serialize)]
struct HealthResp {
    status: &'static str,
    node: String,
    peers: Vec<String>,
    addr: String,
    dag: String,
}

async fn health_handler(State(app): State<Arc<AppState>>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        node: app.cfg.node_id.clone(),
        peers: app.cfg.peers.clone(),
        addr: app.cfg.address.clone(),
        dag: app.cfg.dag_type.clone(),
    })
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/sign", post(auth_sign_handler))
        .route("/peer/attest", post(peer_attest_handler))
        .with_state(app_state)
}
