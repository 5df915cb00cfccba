//! Heartbeat verification.
//!
//! Pure over the payload: no clock, no store, no HTTP. The handler maps
//! a [`HeartbeatReject`] to a 4xx response and a single log line carrying
//! the reject's tag.
//!
//! Verification order (any failure short-circuits):
//! 1. Hash binding: `SHA-256(attestation_bytes)` equals `attestation_hash`.
//! 2. Attestation parses.
//! 3. Key binding: attestation's `child_pub_b64` equals `node_pub_key`.
//! 4. Parent key choice: the heartbeat's `parent_pub_b64` when supplied,
//!    else the monitor's own parent (self-origin traffic).
//! 5. Parent signature, three escalating strategies, first success wins:
//!    a. over the verbatim `signed_payload_b64` bytes when present — and
//!       when present but invalid, the heartbeat is rejected with no
//!       fallback;
//!    b. over the raw attestation bytes;
//!    c. over the legacy canonical string
//!       `"{child_pub}|{created_at}|{policy}|{counter}"`.
//! 6. Child signature over `"heartbeat:" ‖ node_id`.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use thiserror::Error;

use weft_common::{sha256_hex, HeartbeatPayload};
use weft_tpm::{verify_ed25519, Attestation};

/// Rejection reasons, each carrying the wire tag logged and returned to
/// the sender.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HeartbeatReject {
    #[error("attestation_hash_mismatch")]
    AttestationHashMismatch,
    #[error("invalid_attestation_json")]
    InvalidAttestationJson,
    #[error("node_pub_key_mismatch")]
    NodePubKeyMismatch,
    #[error("parent_pub_decode_error")]
    ParentPubDecodeError,
    #[error("attestation_sig_bad_base64")]
    AttestationSigBadBase64,
    #[error("signed_payload_bad_base64")]
    SignedPayloadBadBase64,
    #[error("attestation_sig_invalid_signed_payload")]
    AttestationSigInvalidSignedPayload,
    #[error("attestation_sig_invalid")]
    AttestationSigInvalid,
    #[error("child_pub_bad_base64")]
    ChildPubBadBase64,
    #[error("child_sig_bad_base64")]
    ChildSigBadBase64,
    #[error("child_signature_invalid")]
    ChildSignatureInvalid,
}

impl HeartbeatReject {
    /// The reason tag for log lines and error bodies.
    pub fn tag(&self) -> String {
        self.to_string()
    }
}

/// Verify one heartbeat. Returns the parsed attestation on success so
/// the caller can upsert the registry without re-parsing.
pub fn verify_heartbeat(
    monitor_parent_pub_b64: &str,
    hb: &HeartbeatPayload,
) -> Result<Attestation, HeartbeatReject> {
    let att_bytes = hb.attestation.get().as_bytes();

    if sha256_hex(att_bytes) != hb.attestation_hash {
        return Err(HeartbeatReject::AttestationHashMismatch);
    }

    let att: Attestation = serde_json::from_slice(att_bytes)
        .map_err(|_| HeartbeatReject::InvalidAttestationJson)?;

    if att.child_pub_b64 != hb.node_pub_key {
        return Err(HeartbeatReject::NodePubKeyMismatch);
    }

    let parent_pub_b64 = if hb.parent_pub_b64.is_empty() {
        monitor_parent_pub_b64
    } else {
        hb.parent_pub_b64.as_str()
    };
    let parent_pub = B64
        .decode(parent_pub_b64)
        .map_err(|_| HeartbeatReject::ParentPubDecodeError)?;
    let att_sig = B64
        .decode(&att.sig_b64)
        .map_err(|_| HeartbeatReject::AttestationSigBadBase64)?;

    if !att.signed_payload_b64.is_empty() {
        let payload = B64
            .decode(&att.signed_payload_b64)
            .map_err(|_| HeartbeatReject::SignedPayloadBadBase64)?;
        if !verify_ed25519(&parent_pub, &payload, &att_sig) {
            return Err(HeartbeatReject::AttestationSigInvalidSignedPayload);
        }
    } else {
        let raw_ok = verify_ed25519(&parent_pub, att_bytes, &att_sig);
        let canonical = format!(
            "{}|{}|{}|{}",
            att.child_pub_b64, att.created_at_unix, att.policy, att.counter
        );
        let canonical_ok = verify_ed25519(&parent_pub, canonical.as_bytes(), &att_sig);
        if !raw_ok && !canonical_ok {
            return Err(HeartbeatReject::AttestationSigInvalid);
        }
    }

    let child_pub = B64
        .decode(&hb.node_pub_key)
        .map_err(|_| HeartbeatReject::ChildPubBadBase64)?;
    let child_sig = B64
        .decode(&hb.child_sig_b64)
        .map_err(|_| HeartbeatReject::ChildSigBadBase64)?;
    let msg = format!("heartbeat:{}", hb.node_id);
    if !verify_ed25519(&child_pub, msg.as_bytes(), &child_sig) {
        return Err(HeartbeatReject::ChildSignatureInvalid);
    }

    Ok(att)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use serde_json::value::RawValue;
    use weft_tpm::attestation::canonical_payload;

    struct Fixture {
        parent_pub_b64: String,
        hb: HeartbeatPayload,
    }

    /// Hand-build a fully valid heartbeat with its own parent/child keys.
    fn fixture() -> Fixture {
        let parent = SigningKey::generate(&mut OsRng);
        let child = SigningKey::generate(&mut OsRng);
        let child_pub_b64 = B64.encode(child.verifying_key().to_bytes());

        let payload = canonical_payload(&child_pub_b64, 1_700_000_000, "auth-node", 4).unwrap();
        let att = Attestation {
            child_pub_b64: child_pub_b64.clone(),
            created_at_unix: 1_700_000_000,
            policy: "auth-node".to_string(),
            counter: 4,
            sig_b64: B64.encode(parent.sign(&payload).to_bytes()),
            signed_payload_b64: B64.encode(&payload),
        };
        let att_json = serde_json::to_string(&att).unwrap();
        let attestation_hash = sha256_hex(att_json.as_bytes());
        let child_sig = child.sign(b"heartbeat:n1");

        Fixture {
            parent_pub_b64: B64.encode(parent.verifying_key().to_bytes()),
            hb: HeartbeatPayload {
                node_id: "n1".to_string(),
                dag_type: "auth".to_string(),
                address: "http://n1:8080".to_string(),
                status: "healthy".to_string(),
                node_pub_key: child_pub_b64,
                parent_pub_b64: B64.encode(parent.verifying_key().to_bytes()),
                attestation: RawValue::from_string(att_json).unwrap(),
                attestation_hash,
                child_sig_b64: B64.encode(child_sig.to_bytes()),
            },
        }
    }

    #[test]
    fn test_valid_heartbeat() {
        let f = fixture();
        let att = verify_heartbeat("", &f.hb).expect("verified");
        assert_eq!(att.counter, 4);
    }

    #[test]
    fn test_hash_mismatch_single_byte() {
        let mut f = fixture();
        let mut hash = f.hb.attestation_hash.clone().into_bytes();
        hash[0] = if hash[0] == b'a' { b'b' } else { b'a' };
        f.hb.attestation_hash = String::from_utf8(hash).unwrap();
        assert_eq!(
            verify_heartbeat("", &f.hb),
            Err(HeartbeatReject::AttestationHashMismatch)
        );
    }

    #[test]
    fn test_node_pub_key_mismatch() {
        let mut f = fixture();
        let other = SigningKey::generate(&mut OsRng);
        f.hb.node_pub_key = B64.encode(other.verifying_key().to_bytes());
        assert_eq!(
            verify_heartbeat("", &f.hb),
            Err(HeartbeatReject::NodePubKeyMismatch)
        );
    }

    #[test]
    fn test_monitor_parent_fallback_used() {
        // Without a parent key on the wire, the monitor's own parent is
        // the verification anchor.
        let mut f = fixture();
        let own_parent = f.parent_pub_b64.clone();
        f.hb.parent_pub_b64 = String::new();
        assert!(verify_heartbeat(&own_parent, &f.hb).is_ok());

        let wrong = B64.encode(SigningKey::generate(&mut OsRng).verifying_key().to_bytes());
        assert_eq!(
            verify_heartbeat(&wrong, &f.hb),
            Err(HeartbeatReject::AttestationSigInvalidSignedPayload)
        );
    }

    #[test]
    fn test_signed_payload_invalid_has_no_fallback() {
        // Present-but-wrong signed payload rejects even though the raw
        // attestation bytes would never have verified anyway; the point
        // is the tag says so.
        let mut f = fixture();
        let mut payload: Vec<u8> = {
            let att: Attestation = serde_json::from_str(f.hb.attestation.get()).unwrap();
            B64.decode(att.signed_payload_b64).unwrap()
        };
        payload[0] ^= 0x01;
        let mut att: Attestation = serde_json::from_str(f.hb.attestation.get()).unwrap();
        att.signed_payload_b64 = B64.encode(&payload);
        let att_json = serde_json::to_string(&att).unwrap();
        f.hb.attestation_hash = sha256_hex(att_json.as_bytes());
        f.hb.attestation = RawValue::from_string(att_json).unwrap();

        assert_eq!(
            verify_heartbeat("", &f.hb),
            Err(HeartbeatReject::AttestationSigInvalidSignedPayload)
        );
    }

    #[test]
    fn test_legacy_canonical_fallback() {
        // Legacy attestation: no signed payload, parent signed the
        // pipe-separated canonical string.
        let parent = SigningKey::generate(&mut OsRng);
        let child = SigningKey::generate(&mut OsRng);
        let child_pub_b64 = B64.encode(child.verifying_key().to_bytes());
        let canonical = format!("{child_pub_b64}|1700000000|auth-node|2");
        let att = Attestation {
            child_pub_b64: child_pub_b64.clone(),
            created_at_unix: 1_700_000_000,
            policy: "auth-node".to_string(),
            counter: 2,
            sig_b64: B64.encode(parent.sign(canonical.as_bytes()).to_bytes()),
            signed_payload_b64: String::new(),
        };
        let att_json = serde_json::to_string(&att).unwrap();
        let hb = HeartbeatPayload {
            node_id: "n9".to_string(),
            dag_type: "auth".to_string(),
            address: "http://n9:8080".to_string(),
            status: "healthy".to_string(),
            node_pub_key: child_pub_b64,
            parent_pub_b64: B64.encode(parent.verifying_key().to_bytes()),
            attestation_hash: sha256_hex(att_json.as_bytes()),
            attestation: RawValue::from_string(att_json).unwrap(),
            child_sig_b64: B64.encode(child.sign(b"heartbeat:n9").to_bytes()),
        };
        assert!(verify_heartbeat("", &hb).is_ok());
    }

    #[test]
    fn test_child_signature_invalid() {
        let mut f = fixture();
        let mut sig = B64.decode(&f.hb.child_sig_b64).unwrap();
        sig[0] ^= 0x01;
        f.hb.child_sig_b64 = B64.encode(&sig);
        assert_eq!(
            verify_heartbeat("", &f.hb),
            Err(HeartbeatReject::ChildSignatureInvalid)
        );
    }

    #[test]
    fn test_bad_base64_fields() {
        let mut f = fixture();
        f.hb.child_sig_b64 = "!!!".to_string();
        assert_eq!(
            verify_heartbeat("", &f.hb),
            Err(HeartbeatReject::ChildSigBadBase64)
        );
    }

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(
            HeartbeatReject::AttestationHashMismatch.tag(),
            "attestation_hash_mismatch"
        );
        assert_eq!(
            HeartbeatReject::ChildSignatureInvalid.tag(),
            "child_signature_invalid"
        );
    }
}
