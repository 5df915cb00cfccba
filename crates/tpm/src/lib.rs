//! # Software TPM
//!
//! A software-simulated hardware root of trust. Each process owns one
//! encrypted-at-rest Ed25519 **parent** keypair; the parent mints named
//! **child** signing identities and emits a signed [`Attestation`] binding
//! each child's public key, creation time, policy label, and a monotonic
//! counter.
//!
//! ## Restart model
//!
//! Child private keys live only in memory. After a restart the TPM still
//! knows every child (public half + latest attestation are persisted as
//! one JSON file per child), can hand out attestations, and can verify —
//! but signing stays disabled for that child: the private half is
//! unrecoverable. Re-creating an existing id re-adopts the persisted
//! public key; it never mints a replacement keypair.
//!
//! ## Modules
//! - `tpm`: the [`SoftTpm`] state machine (open / create_child / sign / child_info)
//! - `attestation`: the [`Attestation`] record, canonical payload, [`verify_chain`]
//! - `seal`: AES-256-GCM sealing of the parent key (`nonce ‖ ciphertext`)
//! - `error`: [`TpmInitError`] / [`TpmOpError`] taxonomies

pub mod attestation;
pub mod error;
pub mod seal;
pub mod tpm;

pub use attestation::{verify_chain, verify_ed25519, Attestation, ChainVerifyError};
pub use error::{TpmInitError, TpmOpError};
pub use tpm::{SignOutput, SoftTpm};

/// Environment variable holding the master key material for parent-key
/// sealing. Required; an empty value is a fatal init error.
pub const MASTER_KEY_ENV: &str = "FAKE_TPM_MASTER_KEY";
