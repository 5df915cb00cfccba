//! # Fabric common crate
//!
//! Shared pieces used by both daemons:
//! - `wire`: HTTP body types (heartbeat, attested-event submission, peer fanout)
//! - `hash`: SHA-256 hex helpers
//! - `config`: env-based daemon configuration
//! - `time`: wall-clock helpers

pub mod config;
pub mod hash;
pub mod time;
pub mod wire;

pub use config::{MonitorConfig, NodeConfig};
pub use hash::{sha256_hex, short_hash};
pub use time::now_secs;
pub use wire::{ErrorBody, HeartbeatPayload, PeerAttestBody, SignRequest, SignResponse};
