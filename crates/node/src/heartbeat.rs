//! Heartbeat emitter daemon.
//!
//! Every tick the node asks its TPM child for a fresh signature over
//! `"heartbeat:" ‖ node_id` — advancing the monotonic counter and
//! refreshing the parent-signed attestation — then posts the payload to
//! the monitor. The attestation hash is recomputed each tick over the
//! exact bytes placed on the wire, so the monitor's hash binding stays
//! strict while the registry counter advances.
//!
//! The loop never exits: sign failures (typically post-restart, private
//! key lost), transport errors, and non-200 responses each produce one
//! log line and the next tick is attempted.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde_json::value::RawValue;
use tokio::time::sleep;
use tracing::{info, warn};

use weft_common::{sha256_hex, HeartbeatPayload};

use crate::state::AppState;

/// Interval between heartbeat ticks.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Per-request timeout for the monitor POST.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Run the emitter against `monitor_url` forever.
pub async fn run(app: Arc<AppState>, monitor_url: String) {
    let node_id = app.cfg.node_id.clone();
    let url = format!("{}/heartbeat", monitor_url.trim_end_matches('/'));
    let msg = format!("heartbeat:{node_id}");

    info!(
        "heartbeat emitter started: node={} monitor={} interval={:?}",
        node_id, url, HEARTBEAT_INTERVAL
    );

    loop {
        tick(&app, &node_id, &url, msg.as_bytes()).await;
        sleep(HEARTBEAT_INTERVAL).await;
    }
}

async fn tick(app: &AppState, node_id: &str, url: &str, msg: &[u8]) {
    let out = match app.tpm.sign(node_id, msg) {
        Ok(out) => out,
        Err(_) => {
            info!("heartbeat: node={node_id} verified=false reason=sign_failed");
            return;
        }
    };
    if let Some(e) = &out.persist_error {
        warn!("heartbeat: node={node_id} attestation persist failed: {e}");
    }

    let att_json = match serde_json::to_string(&out.attestation) {
        Ok(j) => j,
        Err(_) => {
            info!("heartbeat: node={node_id} verified=false reason=encode_failed");
            return;
        }
    };
    let attestation_hash = sha256_hex(att_json.as_bytes());
    let attestation = match RawValue::from_string(att_json) {
        Ok(raw) => raw,
        Err(_) => {
            info!("heartbeat: node={node_id} verified=false reason=encode_failed");
            return;
        }
    };

    let payload = HeartbeatPayload {
        node_id: node_id.to_string(),
        dag_type: app.cfg.dag_type.clone(),
        address: app.cfg.address.clone(),
        status: "healthy".to_string(),
        node_pub_key: out.attestation.child_pub_b64.clone(),
        parent_pub_b64: app.tpm.parent_public_b64().to_string(),
        attestation,
        attestation_hash,
        child_sig_b64: B64.encode(out.signature),
    };

    match app
        .http
        .post(url)
        .timeout(REQUEST_TIMEOUT)
        .json(&payload)
        .send()
        .await
    {
        Ok(resp) if resp.status() == StatusCode::OK => {
            info!("heartbeat: node={node_id} verified=true");
        }
        Ok(resp) => {
            info!(
                "heartbeat: node={node_id} verified=false reason=status_{}",
                resp.status().as_u16()
            );
        }
        Err(_) => {
            info!("heartbeat: node={node_id} verified=false reason=net_error");
        }
    }
}
