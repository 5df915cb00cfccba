//! End-to-end heartbeat flow: a real TPM plays the node side, the pure
//! verifier plus the in-memory registry play the monitor side.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::value::RawValue;
use tempfile::TempDir;

use weft_common::{sha256_hex, HeartbeatPayload};
use weft_monitor::{verify_heartbeat, HeartbeatReject};
use weft_store::{MemRegistry, RegistryRow, RegistryStore};
use weft_tpm::SoftTpm;

/// Build a heartbeat exactly the way the emitter does: fresh signature,
/// refreshed attestation on the wire, hash recomputed over those bytes.
fn emit_heartbeat(tpm: &SoftTpm, node_id: &str) -> HeartbeatPayload {
    let msg = format!("heartbeat:{node_id}");
    let out = tpm.sign(node_id, msg.as_bytes()).expect("sign");
    let att_json = serde_json::to_string(&out.attestation).unwrap();
    HeartbeatPayload {
        node_id: node_id.to_string(),
        dag_type: "auth".to_string(),
        address: format!("http://{node_id}:8080"),
        status: "healthy".to_string(),
        node_pub_key: out.attestation.child_pub_b64.clone(),
        parent_pub_b64: tpm.parent_public_b64().to_string(),
        attestation_hash: sha256_hex(att_json.as_bytes()),
        attestation: RawValue::from_string(att_json).unwrap(),
        child_sig_b64: B64.encode(out.signature),
    }
}

#[test]
fn test_happy_path_updates_registry_counter() {
    let dir = TempDir::new().unwrap();
    let tpm = SoftTpm::open(dir.path().join("tpm"), b"dev-pass").unwrap();
    tpm.create_child("n1", "auth-node").unwrap();

    let registry = MemRegistry::new();
    for expected_counter in 1..=3u64 {
        let hb = emit_heartbeat(&tpm, "n1");
        let att = verify_heartbeat("", &hb).expect("verified");
        assert_eq!(att.counter, expected_counter);

        registry
            .upsert_heartbeat(RegistryRow {
                node_id: hb.node_id.clone(),
                dag_type: hb.dag_type.clone(),
                address: hb.address.clone(),
                status: hb.status.clone(),
                node_pub_key: hb.node_pub_key.clone(),
                parent_pub_b64: hb.parent_pub_b64.clone(),
                attestation: serde_json::from_str(hb.attestation.get()).unwrap(),
                attestation_hash: hb.attestation_hash.clone(),
                attestation_verified_at: 100 + expected_counter,
                attestation_counter: att.counter,
                last_seen: 100 + expected_counter,
            })
            .unwrap();
    }

    let row = registry.get("n1").unwrap().unwrap();
    assert_eq!(row.attestation_counter, 3);
}

#[test]
fn test_stale_hash_with_fresh_attestation_rejected() {
    // A sender that refreshes the attestation but keeps the hash it
    // computed at startup fails the binding check. The emitter must
    // recompute the hash every tick.
    let dir = TempDir::new().unwrap();
    let tpm = SoftTpm::open(dir.path().join("tpm"), b"dev-pass").unwrap();
    tpm.create_child("n1", "auth-node").unwrap();

    let first = emit_heartbeat(&tpm, "n1");
    let mut second = emit_heartbeat(&tpm, "n1");
    second.attestation_hash = first.attestation_hash.clone();

    assert_eq!(
        verify_heartbeat("", &second),
        Err(HeartbeatReject::AttestationHashMismatch)
    );
}

#[test]
fn test_registry_untouched_on_reject() {
    let dir = TempDir::new().unwrap();
    let tpm = SoftTpm::open(dir.path().join("tpm"), b"dev-pass").unwrap();
    tpm.create_child("n1", "auth-node").unwrap();

    let mut hb = emit_heartbeat(&tpm, "n1");
    let mut hash = hb.attestation_hash.clone().into_bytes();
    hash[0] = if hash[0] == b'0' { b'1' } else { b'0' };
    hb.attestation_hash = String::from_utf8(hash).unwrap();

    let registry = MemRegistry::new();
    assert!(verify_heartbeat("", &hb).is_err());
    // The handler only upserts after a successful verify; nothing to do
    // here but assert the registry is still empty.
    assert!(registry.get("n1").unwrap().is_none());
}

#[test]
fn test_heartbeat_after_restart_is_skippable_not_forgeable() {
    // After a restart the node cannot sign. An attacker replaying the
    // last good heartbeat verbatim still verifies (it is genuinely
    // signed), but any attempt to advance the counter without the child
    // key fails the child-signature check.
    let dir = TempDir::new().unwrap();
    let storage = dir.path().join("tpm");

    let last_good = {
        let tpm = SoftTpm::open(&storage, b"dev-pass").unwrap();
        tpm.create_child("n1", "auth-node").unwrap();
        emit_heartbeat(&tpm, "n1")
    };

    let tpm = SoftTpm::open(&storage, b"dev-pass").unwrap();
    assert!(tpm.sign("n1", b"heartbeat:n1").is_err());

    // Replay verifies.
    assert!(verify_heartbeat("", &last_good).is_ok());

    // Forged advance: bump the counter, rebuild the signed payload, keep
    // the old parent signature (the forger has no parent key).
    let mut att: weft_tpm::Attestation =
        serde_json::from_str(last_good.attestation.get()).unwrap();
    att.counter += 1;
    let rebuilt = weft_tpm::attestation::canonical_payload(
        &att.child_pub_b64,
        att.created_at_unix,
        &att.policy,
        att.counter,
    )
    .unwrap();
    att.signed_payload_b64 = B64.encode(&rebuilt);
    let forged_json = serde_json::to_string(&att).unwrap();
    let mut forged = last_good.clone();
    forged.attestation_hash = sha256_hex(forged_json.as_bytes());
    forged.attestation = RawValue::from_string(forged_json).unwrap();

    assert_eq!(
        verify_heartbeat("", &forged),
        Err(HeartbeatReject::AttestationSigInvalidSignedPayload)
    );
}
