//! Attestation records and signing-chain verification.
//!
//! An [`Attestation`] is the parent-signed statement about a child
//! identity. The parent signs the canonically-ordered JSON of
//! `{child_pub_b64, created_at_unix, policy?, counter}`; the exact signed
//! bytes are carried verbatim in `signed_payload_b64` so that verifiers
//! never have to reproduce the serializer. [`verify_chain`] checks the
//! full chain: parent over the attestation payload, child over the
//! caller's message.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parent-signed record binding a child public key, creation time,
/// policy label, and monotonic counter.
///
/// `signed_payload_b64` is optional on the wire (omitted when empty) for
/// compatibility with legacy attestations that predate payload carriage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub child_pub_b64: String,
    pub created_at_unix: i64,
    pub policy: String,
    pub counter: u64,
    /// Parent Ed25519 signature over the signed payload, base64.
    pub sig_b64: String,
    /// The exact bytes the parent signed, base64. Preferred by verifiers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signed_payload_b64: String,
}

/// Canonical attestation payload: the structure the parent actually signs.
/// Field order is fixed; `policy` is omitted when empty, matching the
/// minting serializer exactly.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    child_pub_b64: &'a str,
    created_at_unix: i64,
    #[serde(skip_serializing_if = "str_is_empty")]
    policy: &'a str,
    counter: u64,
}

fn str_is_empty(s: &str) -> bool {
    s.is_empty()
}

/// Serialize the canonical payload for a given set of attestation fields.
pub fn canonical_payload(
    child_pub_b64: &str,
    created_at_unix: i64,
    policy: &str,
    counter: u64,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&CanonicalPayload {
        child_pub_b64,
        created_at_unix,
        policy,
        counter,
    })
}

/// Chain verification failures, ordered by the stage that produced them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainVerifyError {
    /// A base64 field of the attestation failed to decode.
    #[error("bad base64 in attestation field `{0}`")]
    BadBase64(&'static str),

    /// The parent signature does not verify over the attestation payload.
    #[error("invalid attestation signature")]
    InvalidAttestationSignature,

    /// The child signature does not verify over the message.
    #[error("invalid child signature")]
    InvalidChildSignature,
}

/// Verify an Ed25519 signature. Returns `false` for any malformed key or
/// signature bytes rather than surfacing the decode failure.
pub fn verify_ed25519(pub_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> bool {
    let pub_arr: [u8; 32] = match pub_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    let vk = match VerifyingKey::from_bytes(&pub_arr) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let sig_arr: [u8; 64] = match sig_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    vk.verify(msg, &Signature::from_bytes(&sig_arr)).is_ok()
}

/// Verify the two-layer signing chain for `msg` under `parent_pub`.
///
/// 1. Decode the attestation's child public key and parent signature.
/// 2. Obtain the payload the parent signed: the verbatim
///    `signed_payload_b64` bytes when present, otherwise the canonical
///    JSON reconstructed from the attestation fields.
/// 3. Check the parent signature over that payload.
/// 4. Check `child_sig` over `msg` under the child public key.
///
/// A free function: no TPM instance is required to verify.
pub fn verify_chain(
    parent_pub: &[u8],
    msg: &[u8],
    child_sig: &[u8],
    att: &Attestation,
) -> Result<(), ChainVerifyError> {
    let child_pub = B64
        .decode(&att.child_pub_b64)
        .map_err(|_| ChainVerifyError::BadBase64("child_pub_b64"))?;
    let parent_sig = B64
        .decode(&att.sig_b64)
        .map_err(|_| ChainVerifyError::BadBase64("sig_b64"))?;

    let payload = if !att.signed_payload_b64.is_empty() {
        B64.decode(&att.signed_payload_b64)
            .map_err(|_| ChainVerifyError::BadBase64("signed_payload_b64"))?
    } else {
        canonical_payload(&att.child_pub_b64, att.created_at_unix, &att.policy, att.counter)
            .map_err(|_| ChainVerifyError::InvalidAttestationSignature)?
    };

    if !verify_ed25519(parent_pub, &payload, &parent_sig) {
        return Err(ChainVerifyError::InvalidAttestationSignature);
    }
    if !verify_ed25519(&child_pub, msg, child_sig) {
        return Err(ChainVerifyError::InvalidChildSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn keypair() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    /// Build a valid attestation + child signature over `msg` by hand.
    fn make_chain(msg: &[u8]) -> (Vec<u8>, Vec<u8>, Attestation) {
        let parent = keypair();
        let child = keypair();
        let child_pub_b64 = B64.encode(child.verifying_key().to_bytes());
        let payload = canonical_payload(&child_pub_b64, 1_700_000_000, "auth-node", 3).unwrap();
        let parent_sig = parent.sign(&payload);
        let att = Attestation {
            child_pub_b64,
            created_at_unix: 1_700_000_000,
            policy: "auth-node".to_string(),
            counter: 3,
            sig_b64: B64.encode(parent_sig.to_bytes()),
            signed_payload_b64: B64.encode(&payload),
        };
        let child_sig = child.sign(msg).to_bytes().to_vec();
        (parent.verifying_key().to_bytes().to_vec(), child_sig, att)
    }

    #[test]
    fn test_verify_chain_ok() {
        let (parent_pub, child_sig, att) = make_chain(b"heartbeat:n1");
        assert!(verify_chain(&parent_pub, b"heartbeat:n1", &child_sig, &att).is_ok());
    }

    #[test]
    fn test_verify_chain_wrong_message() {
        let (parent_pub, child_sig, att) = make_chain(b"heartbeat:n1");
        assert_eq!(
            verify_chain(&parent_pub, b"heartbeat:n2", &child_sig, &att),
            Err(ChainVerifyError::InvalidChildSignature)
        );
    }

    #[test]
    fn test_verify_chain_tampered_child_sig() {
        let (parent_pub, mut child_sig, att) = make_chain(b"m");
        child_sig[0] ^= 0x01;
        assert_eq!(
            verify_chain(&parent_pub, b"m", &child_sig, &att),
            Err(ChainVerifyError::InvalidChildSignature)
        );
    }

    #[test]
    fn test_verify_chain_tampered_payload() {
        let (parent_pub, child_sig, mut att) = make_chain(b"m");
        let mut payload = B64.decode(&att.signed_payload_b64).unwrap();
        payload[0] ^= 0x01;
        att.signed_payload_b64 = B64.encode(&payload);
        assert_eq!(
            verify_chain(&parent_pub, b"m", &child_sig, &att),
            Err(ChainVerifyError::InvalidAttestationSignature)
        );
    }

    #[test]
    fn test_verify_chain_tampered_parent_sig() {
        let (parent_pub, child_sig, mut att) = make_chain(b"m");
        let mut sig = B64.decode(&att.sig_b64).unwrap();
        sig[10] ^= 0x01;
        att.sig_b64 = B64.encode(&sig);
        assert_eq!(
            verify_chain(&parent_pub, b"m", &child_sig, &att),
            Err(ChainVerifyError::InvalidAttestationSignature)
        );
    }

    #[test]
    fn test_verify_chain_canonical_fallback() {
        // Legacy attestation: no signed_payload_b64; the parent signed the
        // canonical JSON directly.
        let (parent_pub, child_sig, mut att) = make_chain(b"m");
        att.signed_payload_b64 = String::new();
        assert!(verify_chain(&parent_pub, b"m", &child_sig, &att).is_ok());
    }

    #[test]
    fn test_verify_chain_bad_base64() {
        let (parent_pub, child_sig, mut att) = make_chain(b"m");
        att.child_pub_b64 = "not base64!!!".to_string();
        assert_eq!(
            verify_chain(&parent_pub, b"m", &child_sig, &att),
            Err(ChainVerifyError::BadBase64("child_pub_b64"))
        );
    }

    #[test]
    fn test_canonical_payload_omits_empty_policy() {
        let with = canonical_payload("cp", 1, "p", 2).unwrap();
        let without = canonical_payload("cp", 1, "", 2).unwrap();
        assert!(String::from_utf8(with).unwrap().contains("\"policy\""));
        assert!(!String::from_utf8(without).unwrap().contains("\"policy\""));
    }

    #[test]
    fn test_attestation_wire_omits_empty_signed_payload() {
        let att = Attestation {
            child_pub_b64: "cp".into(),
            created_at_unix: 1,
            policy: "p".into(),
            counter: 0,
            sig_b64: "sig".into(),
            signed_payload_b64: String::new(),
        };
        let json = serde_json::to_string(&att).unwrap();
        assert!(!json.contains("signed_payload_b64"));
        let back: Attestation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, att);
    }
}
