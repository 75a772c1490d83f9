//! Persists one Ed25519 identity per network (or `"default"`) forever.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{MeshError, Result};
use crate::identity::keypair::IdentityKeypair;

const DEFAULT_NETWORK: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredIdentity {
    private_key_base64: String,
    created_at: DateTime<Utc>,
}

/// Map from network id (or `"default"`) to its stored identity, persisted
/// as pretty-printed, sorted-key JSON at `identities.json`.
pub struct IdentityStore {
    path: PathBuf,
    // BTreeMap keeps keys sorted for free, matching the "sorted keys"
    // persistence requirement without a separate sort pass on save.
    identities: Mutex<BTreeMap<String, StoredIdentity>>,
}

impl IdentityStore {
    pub fn open(home: &Path) -> Result<Self> {
        let path = home.join(".omerta/mesh/identities.json");
        let identities = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("identities.json failed to parse ({e}); starting fresh");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Ok(Self {
            path,
            identities: Mutex::new(identities),
        })
    }

    /// Returns the identity for `network_id` (or `"default"` when `None`),
    /// creating and persisting a fresh one if none exists. Operations on
    /// this store are serialized by the internal mutex, so two concurrent
    /// callers for the same network id are guaranteed not to create two
    /// identities.
    pub fn get_or_create_identity(&self, network_id: Option<&str>) -> Result<IdentityKeypair> {
        let key = network_id.unwrap_or(DEFAULT_NETWORK).to_string();
        let mut identities = self.identities.lock();
        if let Some(existing) = identities.get(&key) {
            return IdentityKeypair::from_base64_private_key(&existing.private_key_base64);
        }

        let keypair = IdentityKeypair::generate();
        identities.insert(
            key,
            StoredIdentity {
                private_key_base64: keypair.private_key_base64(),
                created_at: Utc::now(),
            },
        );
        self.persist(&identities)?;
        Ok(keypair)
    }

    pub fn delete(&self, network_id: Option<&str>) -> Result<()> {
        let key = network_id.unwrap_or(DEFAULT_NETWORK).to_string();
        let mut identities = self.identities.lock();
        identities.remove(&key);
        self.persist(&identities)
    }

    fn persist(&self, identities: &BTreeMap<String, StoredIdentity>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(identities)?;
        write_then_rename(&self.path, &json)
    }
}

/// Write a temp file in the target directory, then atomically rename it
/// over the destination. Avoids torn writes on crash/concurrent readers.
pub(crate) fn write_then_rename(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| MeshError::PersistenceFailed("no parent directory".to_string()))?;
    let tmp_path = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store"),
        std::process::id()
    ));
    std::fs::write(&tmp_path, contents).map_err(|e| MeshError::PersistenceFailed(e.to_string()))?;
    std::fs::rename(&tmp_path, path).map_err(|e| MeshError::PersistenceFailed(e.to_string()))?;
    Ok(())
}

/// Removes the legacy, non-network-scoped peer cache file if present. Run
/// once per store construction; failures are logged and non-fatal.
pub fn migrate_legacy_peer_file(home: &Path) {
    let legacy = home.join(".omerta/mesh/peers.json");
    if legacy.exists() {
        match std::fs::remove_file(&legacy) {
            Ok(()) => info!("removed legacy peer cache at {}", legacy.display()),
            Err(e) => warn!("failed to remove legacy peer cache at {}: {e}", legacy.display()),
        }
    }
}
