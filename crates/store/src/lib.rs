//! # Fabric stores
//!
//! The ledger database is an external collaborator: the daemons talk to
//! it only through the traits in this crate, which model an abstract
//! transactional row store over the fabric's six tables. The in-memory
//! implementations ([`MemStore`], [`MemRegistry`]) are the reference
//! backend used by the daemons and the test suites; a SQL-backed
//! implementation plugs in behind the same traits.
//!
//! - `rows`: row value types mirroring the table schemas
//! - `ledger`: node-side store (attestations, DAG nodes, tamper alerts)
//! - `registry`: monitor-side registry of verified live nodes
//! - `mem`: in-memory implementations

pub mod ledger;
pub mod mem;
pub mod registry;
pub mod rows;

pub use ledger::{LedgerStore, LedgerTx, NewDagNode, StoreError};
pub use mem::{MemRegistry, MemStore};
pub use registry::RegistryStore;
pub use rows::{
    DagNodeRow, NodeAttestationRow, NodeRow, RegistryRow, TamperAlertRow, VerificationLogRow,
};
