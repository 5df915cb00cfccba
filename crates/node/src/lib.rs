//! # Fabric node daemon
//!
//! A node accepts attested DAG events (`/api/auth/sign`), verifies the
//! two-layer signing chain, persists the event in one ledger
//! transaction, fans the accepted attestation out to its peers, and
//! emits a periodic signed heartbeat to the monitor.
//!
//! - `state`: the application context threaded into every handler
//! - `handlers`: HTTP surface + the ingest pipeline
//! - `propagate`: bounded-concurrency peer fanout with backoff
//! - `heartbeat`: the emitter daemon loop

pub mod handlers;
pub mod heartbeat;
pub mod propagate;
pub mod state;

pub use handlers::{build_router, process_sign_request, SignReject};
pub use state::AppState;
