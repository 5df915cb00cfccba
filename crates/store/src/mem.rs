//! In-memory reference implementations of the store traits.
//!
//! [`MemStore`] serializes transactions by holding the table lock for
//! the lifetime of each [`LedgerTx`]: `begin` clones the tables, writes
//! go to the clone, `commit` swaps the clone back in. Dropping the
//! transaction without committing discards the clone — rollback for
//! free, and readers never observe a half-applied pipeline.

use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;

use crate::ledger::{LedgerStore, LedgerTx, NewDagNode, StoreError};
use crate::registry::RegistryStore;
use crate::rows::{
    DagNodeRow, NodeAttestationRow, NodeRow, RegistryRow, TamperAlertRow, VerificationLogRow,
};

#[derive(Clone, Default)]
struct Tables {
    nodes: HashMap<String, NodeRow>,
    attestations: Vec<NodeAttestationRow>,
    dag_nodes: Vec<DagNodeRow>,
    verification_log: Vec<VerificationLogRow>,
    tamper_alerts: Vec<TamperAlertRow>,
    next_attestation_id: i64,
    next_dag_id: i64,
    next_log_id: i64,
    next_alert_id: i64,
}

impl Tables {
    fn upsert_attestation(
        &mut self,
        node_id: &str,
        nonce: &str,
        signature: &str,
        verified: bool,
        verified_at: Option<u64>,
        details: Value,
    ) {
        if let Some(row) = self
            .attestations
            .iter_mut()
            .find(|r| r.node_id == node_id && r.nonce == nonce)
        {
            row.signature = signature.to_string();
            row.verified = verified;
            row.verified_at = verified_at;
            row.details = details;
            return;
        }
        self.next_attestation_id += 1;
        self.attestations.push(NodeAttestationRow {
            id: self.next_attestation_id,
            node_id: node_id.to_string(),
            nonce: nonce.to_string(),
            signature: signature.to_string(),
            verified,
            verified_at,
            details,
        });
    }
}

/// In-memory [`LedgerStore`].
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted DAG rows (test/inspection helper).
    pub fn dag_node_count(&self) -> usize {
        self.inner.lock().dag_nodes.len()
    }

    /// All attestation rows (test/inspection helper).
    pub fn attestation_rows(&self) -> Vec<NodeAttestationRow> {
        self.inner.lock().attestations.clone()
    }
}

struct MemTx<'a> {
    guard: MutexGuard<'a, Tables>,
    staged: Tables,
}

impl LedgerTx for MemTx<'_> {
    fn upsert_attestation(
        &mut self,
        node_id: &str,
        nonce: &str,
        signature: &str,
        verified: bool,
        verified_at: Option<u64>,
        details: Value,
    ) -> Result<(), StoreError> {
        self.staged
            .upsert_attestation(node_id, nonce, signature, verified, verified_at, details);
        Ok(())
    }

    fn upsert_node(&mut self, node_id: &str, tpm_pub: &str, last_seen: u64) -> Result<(), StoreError> {
        self.staged.nodes.insert(
            node_id.to_string(),
            NodeRow {
                node_id: node_id.to_string(),
                tpm_pub: tpm_pub.to_string(),
                last_seen,
            },
        );
        Ok(())
    }

    fn insert_dag_node(&mut self, row: NewDagNode) -> Result<i64, StoreError> {
        if let Some(existing) = self.staged.dag_nodes.iter().find(|r| r.tx_hash == row.tx_hash) {
            return Ok(existing.id);
        }
        self.staged.next_dag_id += 1;
        let id = self.staged.next_dag_id;
        self.staged.dag_nodes.push(DagNodeRow {
            id,
            account_id: row.account_id,
            event_type: row.event_type,
            payload: row.payload,
            tx_hash: row.tx_hash,
            parents: row.parents,
            dag_type: row.dag_type,
            node_id: row.node_id,
            node_signature: row.node_signature,
            created_at: row.created_at,
        });
        Ok(id)
    }

    fn insert_verification_log(
        &mut self,
        entity_type: &str,
        entity_id: i64,
        verified: bool,
        verifier_node: &str,
        details: Value,
    ) -> Result<i64, StoreError> {
        self.staged.next_log_id += 1;
        let id = self.staged.next_log_id;
        self.staged.verification_log.push(VerificationLogRow {
            id,
            entity_type: entity_type.to_string(),
            entity_id,
            verified,
            verifier_node: verifier_node.to_string(),
            details,
        });
        Ok(id)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

impl LedgerStore for MemStore {
    fn begin(&self) -> Result<Box<dyn LedgerTx + '_>, StoreError> {
        let guard = self.inner.lock();
        let staged = guard.clone();
        Ok(Box::new(MemTx { guard, staged }))
    }

    fn record_tamper_alert(
        &self,
        offending_node: &str,
        description: &str,
        evidence: Value,
        created_at: u64,
    ) -> Result<i64, StoreError> {
        let mut tables = self.inner.lock();
        tables.next_alert_id += 1;
        let id = tables.next_alert_id;
        tables.tamper_alerts.push(TamperAlertRow {
            id,
            offending_node: offending_node.to_string(),
            description: description.to_string(),
            evidence,
            created_at,
        });
        Ok(id)
    }

    fn record_failed_attestation(
        &self,
        node_id: &str,
        nonce: &str,
        signature: &str,
        details: Value,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .upsert_attestation(node_id, nonce, signature, false, None, details);
        Ok(())
    }

    fn record_peer_attestation(
        &self,
        node_id: &str,
        attestation_hash: &str,
        details: Value,
        received_at: u64,
    ) -> Result<(), StoreError> {
        self.inner.lock().upsert_attestation(
            node_id,
            attestation_hash,
            "",
            true,
            Some(received_at),
            details,
        );
        Ok(())
    }

    fn dag_node_by_tx_hash(&self, tx_hash: &str) -> Result<Option<DagNodeRow>, StoreError> {
        Ok(self
            .inner
            .lock()
            .dag_nodes
            .iter()
            .find(|r| r.tx_hash == tx_hash)
            .cloned())
    }

    fn tamper_alerts(&self) -> Result<Vec<TamperAlertRow>, StoreError> {
        Ok(self.inner.lock().tamper_alerts.clone())
    }
}

/// In-memory [`RegistryStore`].
#[derive(Default)]
pub struct MemRegistry {
    inner: Mutex<HashMap<String, RegistryRow>>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemRegistry {
    fn upsert_heartbeat(&self, row: RegistryRow) -> Result<(), StoreError> {
        self.inner.lock().insert(row.node_id.clone(), row);
        Ok(())
    }

    fn recent(&self, now: u64, window_secs: u64) -> Result<Vec<RegistryRow>, StoreError> {
        let mut rows: Vec<RegistryRow> = self
            .inner
            .lock()
            .values()
            .filter(|r| now.saturating_sub(r.last_seen) < window_secs)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(rows)
    }

    fn get(&self, node_id: &str) -> Result<Option<RegistryRow>, StoreError> {
        Ok(self.inner.lock().get(node_id).cloned())
    }
}
