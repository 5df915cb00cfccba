//! Row value types for the fabric's tables.
//!
//! Plain serializable values. No system clock access — every timestamp
//! is caller-provided, so the rows stay deterministic under test.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `nodes` — last-seen view of peers that submitted verified events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub node_id: String,
    /// The node's TPM child public key, base64.
    pub tpm_pub: String,
    /// Unix seconds.
    pub last_seen: u64,
}

/// `node_attestations` — one row per `(node_id, nonce)` submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeAttestationRow {
    pub id: i64,
    pub node_id: String,
    pub nonce: String,
    /// The child signature that accompanied the submission, base64.
    pub signature: String,
    pub verified: bool,
    pub verified_at: Option<u64>,
    /// The attestation as submitted.
    pub details: Value,
}

/// `dag_nodes` — persisted DAG events, unique by `tx_hash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DagNodeRow {
    pub id: i64,
    pub account_id: Option<String>,
    pub event_type: String,
    pub payload: Value,
    /// `SHA-256(payload_json ‖ node_signature ‖ attestation_hash_hex)`.
    pub tx_hash: String,
    pub parents: Vec<String>,
    pub dag_type: String,
    pub node_id: String,
    pub node_signature: String,
    pub created_at: u64,
}

/// `verification_log` — audit rows referencing a verified entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationLogRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub verified: bool,
    pub verifier_node: String,
    pub details: Value,
}

/// `tamper_alerts` — one row per verification failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TamperAlertRow {
    pub id: i64,
    pub offending_node: String,
    pub description: String,
    pub evidence: Value,
    pub created_at: u64,
}

/// `nodes_registry` — the monitor's registry of verified live nodes,
/// keyed by `node_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryRow {
    pub node_id: String,
    pub dag_type: String,
    pub address: String,
    pub status: String,
    /// Child public key, base64.
    pub node_pub_key: String,
    /// Parent public key, base64.
    pub parent_pub_b64: String,
    /// Latest verified attestation blob.
    pub attestation: Value,
    /// Lowercase hex SHA-256 of the attestation bytes.
    pub attestation_hash: String,
    pub attestation_verified_at: u64,
    pub attestation_counter: u64,
    pub last_seen: u64,
}
