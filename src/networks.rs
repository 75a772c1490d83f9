//! Persists the set of networks a user has joined, independent of any
//! single network's scoped peer store: `{ networkId: NetworkKey }` at
//! `<home>/Library/Application Support/OmertaMesh/networks.json` on macOS,
//! or `<home>/.local/share/OmertaMesh/networks.json` elsewhere.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;
use crate::identity::store::write_then_rename;
use crate::types::network_key::NetworkKey;

/// Where `networks.json` lives under a given home directory, matching the
/// platform split §6 calls for.
pub fn networks_file_path(home: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support/OmertaMesh/networks.json")
    } else {
        home.join(".local/share/OmertaMesh/networks.json")
    }
}

/// Every network this installation has joined, keyed by `NetworkId`, kept
/// in sync with `networks.json` on every mutation.
pub struct NetworkStore {
    path: PathBuf,
    networks: Mutex<BTreeMap<String, NetworkKey>>,
}

impl NetworkStore {
    pub fn open(home: &Path) -> Result<Self> {
        let path = networks_file_path(home);
        let networks = load(&path);
        Ok(Self {
            path,
            networks: Mutex::new(networks),
        })
    }

    /// Remember `network_key` under its own `NetworkId`, overwriting any
    /// previous record for the same network.
    pub fn upsert(&self, network_key: NetworkKey) -> Result<()> {
        let id = network_key.network_id();
        self.networks.lock().insert(id, network_key);
        self.save()
    }

    pub fn get(&self, network_id: &str) -> Option<NetworkKey> {
        self.networks.lock().get(network_id).cloned()
    }

    pub fn remove(&self, network_id: &str) -> Result<()> {
        self.networks.lock().remove(network_id);
        self.save()
    }

    pub fn all(&self) -> Vec<NetworkKey> {
        self.networks.lock().values().cloned().collect()
    }

    fn save(&self) -> Result<()> {
        let networks = self.networks.lock();
        let json = serde_json::to_vec_pretty(&*networks)?;
        drop(networks);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_then_rename(&self.path, &json)
    }
}

fn load(path: &Path) -> BTreeMap<String, NetworkKey> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_slice(&bytes) {
        Ok(map) => map,
        Err(e) => {
            warn!("networks.json failed to parse ({e}); starting fresh");
            BTreeMap::new()
        }
    }
}
