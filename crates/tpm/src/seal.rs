//! Parent-key sealing: AES-256-GCM under a SHA-256 derived key.
//!
//! Blob format: `nonce (12 bytes) || ciphertext`. The sealing key is
//! `SHA-256(master_key_material)`; no additional authenticated data.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// AES-GCM standard nonce size.
pub const GCM_NONCE_LEN: usize = 12;

/// Sealing failures. `Open` covers both a wrong key and a tampered blob;
/// GCM does not distinguish the two.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("cipher init failed")]
    CipherInit,
    #[error("os rng failed: {0}")]
    Rng(String),
    #[error("encrypt failed")]
    Encrypt,
    #[error("sealed blob too short")]
    TooShort,
    #[error("decrypt failed")]
    Open,
}

/// Derive the 32-byte sealing key from master key material: `SHA-256(master)`.
pub fn derive_key(master: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(master);
    hasher.finalize().into()
}

/// Seal `plaintext` under `key`. Output: `nonce || ciphertext`.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError::CipherInit)?;

    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| SealError::Rng(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|_| SealError::Encrypt)?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a blob produced by [`seal`]. Expects `nonce || ciphertext`.
pub fn open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, SealError> {
    if blob.len() < GCM_NONCE_LEN {
        return Err(SealError::TooShort);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(GCM_NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SealError::CipherInit)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher.decrypt(nonce, ciphertext).map_err(|_| SealError::Open)
}
