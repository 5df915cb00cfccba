//! HTTP body types shared across the fabric.
//!
//! Attestations received over the wire are carried as
//! [`Box<RawValue>`](serde_json::value::RawValue) so hashing and
//! signature checks always operate on the verbatim bytes the sender
//! produced. Re-serializing would break hash binding.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Periodic heartbeat a node posts to the monitor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub node_id: String,
    pub dag_type: String,
    pub address: String,
    pub status: String,
    /// The child public key, base64. Must equal the attestation's
    /// `child_pub_b64`.
    pub node_pub_key: String,
    /// The sender's parent public key, base64. When empty the monitor
    /// falls back to its own parent key (self-origin traffic).
    #[serde(default)]
    pub parent_pub_b64: String,
    /// Verbatim attestation bytes.
    pub attestation: Box<RawValue>,
    /// Lowercase hex SHA-256 of the attestation bytes.
    pub attestation_hash: String,
    /// Child signature over `"heartbeat:" ‖ node_id`, base64.
    pub child_sig_b64: String,
}

/// Attested DAG event submission (`POST /api/auth/sign`).
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub node_id: String,
    pub nonce: String,
    pub parent_pub_b64: String,
    pub child_sig_b64: String,
    /// Verbatim attestation bytes.
    pub attestation: Box<RawValue>,
    pub event_type: String,
    /// Opaque event payload; defaults to `{}` when absent.
    #[serde(default)]
    pub event_payload: Option<Box<RawValue>>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub node_signature: String,
}

/// Success body for `POST /api/auth/sign`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignResponse {
    pub ok: bool,
    pub attestation_hash: String,
    pub dag_tx_hash: String,
    pub dag_node_id: i64,
}

/// Peer fanout body (`POST /peer/attest`). `attestation_hash` carries the
/// DAG `tx_hash` under which the event was accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerAttestBody {
    pub node_id: String,
    pub attestation: Box<RawValue>,
    pub attestation_hash: String,
}

/// Structured error body: `{error: <tag>, details?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self { error: tag.into(), details: None }
    }

    pub fn with_details(tag: impl Into<String>, details: impl Into<String>) -> Self {
        Self { error: tag.into(), details: Some(details.into()) }
    }
}
