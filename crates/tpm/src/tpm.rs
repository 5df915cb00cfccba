//! The [`SoftTpm`]: parent key lifecycle, child minting, counter-bumped
//! signing, and crash-safe metadata persistence.
//!
//! ## On-disk layout
//!
//! ```text
//! {storage_dir}/
//! ├── parent.key.enc        # nonce ‖ AES-256-GCM(ed25519 keypair, 64 bytes)
//! └── children/
//!     └── {child_id}.json   # indented JSON of the child's Attestation
//! ```
//!
//! Directories are created with mode `0700`, files written with `0600`.
//! Every write goes to `{path}.tmp` first and is renamed into place, so a
//! reader never observes a partial file.
//!
//! ## Concurrency
//!
//! The child map sits behind a single mutex; `create_child` and `sign`
//! serialize fully (including their disk writes), `child_info` takes the
//! lock only around the map access and any lazy disk adoption. The parent
//! key is immutable after open and needs no lock.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};

use crate::attestation::{canonical_payload, Attestation};
use crate::error::{TpmInitError, TpmOpError};
use crate::seal;

/// Filename of the encrypted parent key inside the storage directory.
const PARENT_KEY_FILE: &str = "parent.key.enc";
/// Subdirectory holding one metadata file per child.
const CHILDREN_DIR: &str = "children";

/// Result of a [`SoftTpm::sign`] call.
///
/// The signature is always valid when this value is returned. If the
/// refreshed attestation could not be persisted, `persist_error` is set:
/// the caller holds a usable signature, but the child counter may regress
/// to the last persisted value on restart.
#[derive(Clone, Debug)]
pub struct SignOutput {
    /// Ed25519 child signature over the caller's message.
    pub signature: [u8; 64],
    /// The refreshed attestation (counter bumped, re-signed by the parent).
    pub attestation: Attestation,
    /// Set when persisting the refreshed attestation failed.
    pub persist_error: Option<TpmOpError>,
}

/// In-memory view of one child identity. The signing key is `None` for
/// children adopted from disk after a restart.
struct Child {
    signing: Option<SigningKey>,
    counter: u64,
    att: Attestation,
}

/// A software-simulated TPM with an encrypted-at-rest parent key and a
/// persisted registry of child identities.
pub struct SoftTpm {
    storage_dir: PathBuf,
    parent: SigningKey,
    parent_pub_b64: String,
    children: Mutex<HashMap<String, Child>>,
}

impl SoftTpm {
    /// Open (or initialize) a TPM rooted at `storage_dir`.
    ///
    /// Creates the storage layout, restores or mints the parent keypair,
    /// and scans `children/` so that persisted children are recognized
    /// immediately — with their private halves absent.
    pub fn open(storage_dir: impl Into<PathBuf>, master_key: &[u8]) -> Result<Self, TpmInitError> {
        if master_key.is_empty() {
            return Err(TpmInitError::MissingMasterKey);
        }
        let storage_dir = storage_dir.into();
        create_dir_0700(&storage_dir)?;
        create_dir_0700(&storage_dir.join(CHILDREN_DIR))?;

        let sealing_key = seal::derive_key(master_key);
        let parent_path = storage_dir.join(PARENT_KEY_FILE);
        let parent = if parent_path.is_file() {
            let blob = fs::read(&parent_path)?;
            let plain = seal::open(&sealing_key, &blob).map_err(|_| TpmInitError::DecryptFailed)?;
            let keypair: [u8; 64] = plain.try_into().map_err(|_| TpmInitError::CorruptKeyFile)?;
            let parent = SigningKey::from_keypair_bytes(&keypair)
                .map_err(|_| TpmInitError::CorruptKeyFile)?;
            info!(path = %parent_path.display(), "restored encrypted parent key");
            parent
        } else {
            let parent = SigningKey::generate(&mut OsRng);
            let blob = seal::seal(&sealing_key, &parent.to_keypair_bytes())
                .map_err(|e| TpmInitError::StorageUnavailable(io::Error::other(e.to_string())))?;
            write_atomic_0600(&parent_path, &blob)?;
            info!(path = %parent_path.display(), "minted new parent key");
            parent
        };

        let parent_pub_b64 = B64.encode(parent.verifying_key().to_bytes());
        let tpm = Self {
            storage_dir,
            parent,
            parent_pub_b64,
            children: Mutex::new(HashMap::new()),
        };
        tpm.scan_children()?;
        Ok(tpm)
    }

    /// Open a TPM reading the master key from [`MASTER_KEY_ENV`](crate::MASTER_KEY_ENV).
    pub fn open_from_env(storage_dir: impl Into<PathBuf>) -> Result<Self, TpmInitError> {
        let master = std::env::var(crate::MASTER_KEY_ENV).unwrap_or_default();
        Self::open(storage_dir, master.as_bytes())
    }

    /// The parent public key: the trust anchor for every attestation this
    /// process emits. Stable across restarts under the same master key.
    pub fn parent_public(&self) -> [u8; 32] {
        self.parent.verifying_key().to_bytes()
    }

    /// Base64 form of [`parent_public`](Self::parent_public).
    pub fn parent_public_b64(&self) -> &str {
        &self.parent_pub_b64
    }

    /// Create (or re-adopt) a child identity and return its attestation.
    ///
    /// Tie-break order:
    /// 1. Already in memory → return its current attestation unchanged.
    /// 2. Metadata on disk → adopt it with the private half absent and
    ///    return the persisted attestation. No new keypair is minted for
    ///    an already-known id.
    /// 3. Otherwise mint a fresh keypair with `counter = 0`, sign the
    ///    canonical payload with the parent, and persist atomically.
    pub fn create_child(&self, id: &str, policy: &str) -> Result<(String, Attestation), TpmOpError> {
        if id.is_empty() {
            return Err(TpmOpError::EmptyChildId);
        }
        let mut children = self.children.lock();

        if let Some(c) = children.get(id) {
            return Ok((id.to_string(), c.att.clone()));
        }

        let meta_path = self.child_meta_path(id);
        if meta_path.is_file() {
            let att = load_child_meta(&meta_path).map_err(TpmOpError::CorruptChildMetadata)?;
            warn!(child = id, "re-adopting persisted child; private key absent until re-mint");
            let out = att.clone();
            children.insert(
                id.to_string(),
                Child { signing: None, counter: att.counter, att },
            );
            return Ok((id.to_string(), out));
        }

        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| TpmOpError::RngFailed(e.to_string()))?;
        let signing = SigningKey::from_bytes(&seed);

        let now = now_unix();
        let mut att = Attestation {
            child_pub_b64: B64.encode(signing.verifying_key().to_bytes()),
            created_at_unix: now,
            policy: policy.to_string(),
            counter: 0,
            sig_b64: String::new(),
            signed_payload_b64: String::new(),
        };
        let payload = canonical_payload(&att.child_pub_b64, att.created_at_unix, &att.policy, 0)
            .map_err(|e| TpmOpError::PersistFailed(e.to_string()))?;
        att.sig_b64 = B64.encode(self.parent.sign(&payload).to_bytes());
        att.signed_payload_b64 = B64.encode(&payload);

        self.persist_child(id, &att)
            .map_err(|e| TpmOpError::PersistFailed(e.to_string()))?;

        let out = att.clone();
        children.insert(
            id.to_string(),
            Child { signing: Some(signing), counter: 0, att },
        );
        Ok((id.to_string(), out))
    }

    /// Sign `msg` with a child key, advancing the child's counter and
    /// refreshing its parent-signed attestation.
    ///
    /// The counter bump, re-sign, persist, and message signature happen
    /// atomically under the TPM mutex. If persisting the refreshed
    /// attestation fails, the signature and attestation are still
    /// returned with [`SignOutput::persist_error`] set — the counter may
    /// regress to the last persisted value after a restart.
    pub fn sign(&self, child_id: &str, msg: &[u8]) -> Result<SignOutput, TpmOpError> {
        if child_id.is_empty() {
            return Err(TpmOpError::EmptyChildId);
        }
        let mut children = self.children.lock();
        let c = children.get_mut(child_id).ok_or(TpmOpError::UnknownChild)?;
        let signing = c.signing.as_ref().ok_or(TpmOpError::PrivateKeyUnavailable)?;

        c.counter += 1;
        c.att.counter = c.counter;

        let mut persist_error = None;
        match canonical_payload(&c.att.child_pub_b64, c.att.created_at_unix, &c.att.policy, c.counter)
        {
            Ok(payload) => {
                c.att.sig_b64 = B64.encode(self.parent.sign(&payload).to_bytes());
                c.att.signed_payload_b64 = B64.encode(&payload);
                if let Err(e) = self.persist_child(child_id, &c.att) {
                    persist_error = Some(TpmOpError::PersistFailed(e.to_string()));
                }
            }
            Err(e) => persist_error = Some(TpmOpError::PersistFailed(e.to_string())),
        }

        let signature = signing.sign(msg).to_bytes();
        Ok(SignOutput {
            signature,
            attestation: c.att.clone(),
            persist_error,
        })
    }

    /// Current attestation for a child, lazily adopting persisted
    /// metadata on first access after a restart.
    pub fn child_info(&self, id: &str) -> Result<Attestation, TpmOpError> {
        let mut children = self.children.lock();
        if let Some(c) = children.get(id) {
            return Ok(c.att.clone());
        }
        let meta_path = self.child_meta_path(id);
        if !meta_path.is_file() {
            return Err(TpmOpError::UnknownChild);
        }
        let att = load_child_meta(&meta_path).map_err(TpmOpError::CorruptChildMetadata)?;
        let out = att.clone();
        children.insert(
            id.to_string(),
            Child { signing: None, counter: att.counter, att },
        );
        Ok(out)
    }

    fn child_meta_path(&self, id: &str) -> PathBuf {
        self.storage_dir.join(CHILDREN_DIR).join(format!("{id}.json"))
    }

    fn persist_child(&self, id: &str, att: &Attestation) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(att).map_err(io::Error::other)?;
        write_atomic_0600(&self.child_meta_path(id), &bytes)
    }

    /// Load every `children/*.json` file into the map with the private
    /// half absent, so restarted processes recognize their children.
    fn scan_children(&self) -> Result<(), TpmInitError> {
        let dir = self.storage_dir.join(CHILDREN_DIR);
        let mut children = self.children.lock();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let att = load_child_meta(&path).map_err(|reason| TpmInitError::CorruptChildMetadata {
                path: path.display().to_string(),
                reason,
            })?;
            children.insert(id, Child { signing: None, counter: att.counter, att });
        }
        Ok(())
    }
}

impl std::fmt::Debug for SoftTpm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftTpm")
            .field("storage_dir", &self.storage_dir)
            .field("parent_pub_b64", &self.parent_pub_b64)
            .field("children", &self.children.lock().len())
            .finish()
    }
}

/// Parse and validate one child metadata file. The embedded public key
/// must decode; the reason string feeds the corrupt-metadata errors.
fn load_child_meta(path: &Path) -> Result<Attestation, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let att: Attestation = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    B64.decode(&att.child_pub_b64)
        .map_err(|e| format!("bad base64 child pub: {e}"))?;
    Ok(att)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn create_dir_0700(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    set_mode(path, 0o700)
}

/// Write `bytes` to `{path}.tmp` with mode 0600, then rename onto `path`.
fn write_atomic_0600(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp_os = path.as_os_str().to_owned();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);

    fs::write(&tmp, bytes)?;
    set_mode(&tmp, 0o600)?;
    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
