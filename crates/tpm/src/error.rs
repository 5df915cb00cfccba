//! Error taxonomies for TPM construction and runtime operations.
//!
//! Init errors are fatal at process start; op errors are per-call and
//! carry no key material, so they are safe to log verbatim.

use thiserror::Error;

/// Failures while opening a [`SoftTpm`](crate::SoftTpm) against its
/// storage directory.
#[derive(Debug, Error)]
pub enum TpmInitError {
    /// Storage directories could not be created or inspected.
    #[error("tpm storage unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),

    /// The master key material is empty (or the env var is unset).
    #[error("master key material is empty")]
    MissingMasterKey,

    /// AES-GCM open failed: wrong master key or a tampered key file.
    #[error("failed to decrypt parent key (wrong master key or tampered file)")]
    DecryptFailed,

    /// The decrypted bytes are not a valid Ed25519 keypair.
    #[error("decrypted parent key is not a valid Ed25519 keypair")]
    CorruptKeyFile,

    /// A persisted child metadata file is malformed.
    #[error("corrupt child metadata {path}: {reason}")]
    CorruptChildMetadata { path: String, reason: String },
}

/// Failures of individual TPM operations after a successful open.
///
/// `Clone` so that [`SignOutput`](crate::SignOutput) can carry a
/// persistence failure alongside a still-usable signature.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TpmOpError {
    /// Caller passed an empty child id.
    #[error("child id must not be empty")]
    EmptyChildId,

    /// No in-memory entry and no persisted metadata for the id.
    #[error("unknown child (no in-memory or persisted metadata)")]
    UnknownChild,

    /// The child is known but its private half was lost on restart.
    #[error("child private key not present in memory; cannot sign")]
    PrivateKeyUnavailable,

    /// The OS entropy source failed while minting a keypair.
    #[error("os rng failed: {0}")]
    RngFailed(String),

    /// Child metadata could not be serialized or written.
    #[error("failed to persist child metadata: {0}")]
    PersistFailed(String),

    /// A lazily-loaded child metadata file is malformed.
    #[error("corrupt child metadata: {0}")]
    CorruptChildMetadata(String),
}
