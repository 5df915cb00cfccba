//! Shared application state.
//!
//! Built once in `main` and threaded into handlers and daemon tasks as
//! `Arc<AppState>`; there are no process-wide singletons. The ledger
//! store is trait-typed so the SQL collaborator can replace the
//! in-memory reference backend without touching the handlers.

use std::sync::Arc;

use weft_common::NodeConfig;
use weft_store::LedgerStore;
use weft_tpm::SoftTpm;

/// Everything a node handler or daemon task needs.
pub struct AppState {
    pub cfg: NodeConfig,
    pub tpm: Arc<SoftTpm>,
    pub store: Arc<dyn LedgerStore>,
    /// Outbound HTTP client; carries the 3 s per-request timeout used by
    /// both the propagator and the heartbeat emitter.
    pub http: reqwest::Client,
}
