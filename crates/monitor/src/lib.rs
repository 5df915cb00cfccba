//! # Fabric monitor daemon
//!
//! The monitor ingests periodic signed heartbeats from nodes, verifies
//! the attestation chain bound to each one, and maintains a fresh
//! registry of verified, currently-live participants.
//!
//! - `verify`: pure heartbeat verification (hash binding, key binding,
//!   parent + child signatures)
//! - `handlers`: HTTP surface and registry upsert

pub mod handlers;
pub mod verify;

pub use handlers::{build_router, MonitorState};
pub use verify::{verify_heartbeat, HeartbeatReject};
