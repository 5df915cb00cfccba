//! Node-side ledger store: the transactional ingest path plus the
//! best-effort failure-recording paths.
//!
//! The accepted-event pipeline runs inside one transaction (attestation
//! upsert, node upsert, DAG insert with dedup, verification log); the
//! rejection paths (`record_tamper_alert`, `record_failed_attestation`)
//! are deliberately non-transactional — a failure there must never mask
//! the client-facing verification error.

use serde_json::Value;
use thiserror::Error;

use crate::rows::{DagNodeRow, TamperAlertRow};

/// Store failures, tagged by the stage that produced them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to start transaction: {0}")]
    BeginTx(String),
    #[error("insert failed: {0}")]
    Insert(String),
    #[error("commit failed: {0}")]
    Commit(String),
}

/// Input for a DAG node insert. The store assigns `id` and `created_at`
/// is caller-provided.
#[derive(Clone, Debug)]
pub struct NewDagNode {
    pub account_id: Option<String>,
    pub event_type: String,
    pub payload: Value,
    pub tx_hash: String,
    pub parents: Vec<String>,
    pub dag_type: String,
    pub node_id: String,
    pub node_signature: String,
    pub created_at: u64,
}

/// One open ledger transaction. Dropping without `commit` rolls back.
///
/// Not `Send`: the in-memory backend holds a lock guard for the duration
/// of the transaction, so callers run the transactional section
/// synchronously (never across an await point).
pub trait LedgerTx {
    /// Upsert `node_attestations` keyed by `(node_id, nonce)`.
    fn upsert_attestation(
        &mut self,
        node_id: &str,
        nonce: &str,
        signature: &str,
        verified: bool,
        verified_at: Option<u64>,
        details: Value,
    ) -> Result<(), StoreError>;

    /// Upsert `nodes` keyed by `node_id`.
    fn upsert_node(&mut self, node_id: &str, tpm_pub: &str, last_seen: u64) -> Result<(), StoreError>;

    /// Insert into `dag_nodes` with `ON CONFLICT (tx_hash) DO NOTHING`
    /// semantics: returns the id of the inserted row, or of the existing
    /// row on a dedup hit.
    fn insert_dag_node(&mut self, row: NewDagNode) -> Result<i64, StoreError>;

    /// Insert a `verification_log` row referencing an entity.
    fn insert_verification_log(
        &mut self,
        entity_type: &str,
        entity_id: i64,
        verified: bool,
        verifier_node: &str,
        details: Value,
    ) -> Result<i64, StoreError>;

    /// Make every staged write durable.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// The node daemon's view of the ledger database.
pub trait LedgerStore: Send + Sync {
    /// Begin a transaction over the ingest tables.
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, StoreError>;

    /// Record a tamper alert (non-transactional, best-effort path).
    /// Returns the alert row id.
    fn record_tamper_alert(
        &self,
        offending_node: &str,
        description: &str,
        evidence: Value,
        created_at: u64,
    ) -> Result<i64, StoreError>;

    /// Record a failed (unverified) attestation submission keyed by
    /// `(node_id, nonce)`.
    fn record_failed_attestation(
        &self,
        node_id: &str,
        nonce: &str,
        signature: &str,
        details: Value,
    ) -> Result<(), StoreError>;

    /// Record an attestation received from a peer via fanout, keyed by
    /// `(node_id, attestation_hash)`.
    fn record_peer_attestation(
        &self,
        node_id: &str,
        attestation_hash: &str,
        details: Value,
        received_at: u64,
    ) -> Result<(), StoreError>;

    /// Look up a DAG node by its content hash.
    fn dag_node_by_tx_hash(&self, tx_hash: &str) -> Result<Option<DagNodeRow>, StoreError>;

    /// All recorded tamper alerts, oldest first.
    fn tamper_alerts(&self) -> Result<Vec<TamperAlertRow>, StoreError>;
}
