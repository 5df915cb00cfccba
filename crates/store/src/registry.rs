//! Monitor-side registry of verified, currently-live nodes.

use crate::ledger::StoreError;
use crate::rows::RegistryRow;

/// Freshness window for `recent`: a node is live if its `last_seen` is
/// within this many seconds.
pub const LIVE_WINDOW_SECS: u64 = 10;

/// The monitor's view of `nodes_registry`, keyed by `node_id`.
pub trait RegistryStore: Send + Sync {
    /// Upsert the full registry row for a verified heartbeat. Every
    /// supplied field overwrites the previous value.
    fn upsert_heartbeat(&self, row: RegistryRow) -> Result<(), StoreError>;

    /// Rows with `last_seen` within `window_secs` of `now`, ordered by
    /// `node_id` for stable output.
    fn recent(&self, now: u64, window_secs: u64) -> Result<Vec<RegistryRow>, StoreError>;

    /// Single-row lookup.
    fn get(&self, node_id: &str) -> Result<Option<RegistryRow>, StoreError>;
}
