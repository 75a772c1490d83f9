//! On-disk, network-scoped peer store at
//! `<home>/.omerta/mesh/networks/<networkId>/peers.json`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::constants::DEFAULT_MAX_STORED_PEERS;
use crate::error::Result;
use crate::identity::store::{migrate_legacy_peer_file, write_then_rename};
use crate::types::announcement::{PeerAnnouncement, StoredPeer};
use crate::types::peer_id::PeerId;
use crate::types::reachability::is_valid_path;

const CURRENT_VERSION: u32 = 3;

#[derive(Clone, Copy, Debug)]
pub struct PeerStoreConfig {
    pub max_stored_peers: usize,
}

impl Default for PeerStoreConfig {
    fn default() -> Self {
        Self {
            max_stored_peers: DEFAULT_MAX_STORED_PEERS,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PeerFile {
    version: u32,
    saved_at: u64,
    network_id: String,
    peers: HashMap<String, StoredPeer>,
}

pub struct PeerStore {
    path: PathBuf,
    network_id: String,
    config: PeerStoreConfig,
    peers: Mutex<HashMap<PeerId, StoredPeer>>,
}

impl PeerStore {
    pub fn open(home: &Path, network_id: &str, config: PeerStoreConfig) -> Result<Self> {
        migrate_legacy_peer_file(home);
        let path = home
            .join(".omerta/mesh/networks")
            .join(network_id)
            .join("peers.json");
        let peers = load(&path, network_id);
        Ok(Self {
            path,
            network_id: network_id.to_string(),
            config,
            peers: Mutex::new(peers),
        })
    }

    /// Endpoint-validate, merge with any existing record (incrementing the
    /// appropriate contact counter), then evict if over capacity. Returns
    /// `false` without storing anything if no reachability path survives
    /// validation.
    pub fn update(&self, announcement: PeerAnnouncement, contact_successful: bool) -> Result<bool> {
        if announcement.valid_reachability(false).is_empty() {
            return Ok(false);
        }
        let peer_id = announcement.peer_id;
        {
            let mut peers = self.peers.lock();
            match peers.get_mut(&peer_id) {
                Some(existing) => {
                    existing.announcement = announcement;
                    existing.record_contact(contact_successful);
                }
                None => {
                    let mut stored = StoredPeer::new(announcement);
                    stored.record_contact(contact_successful);
                    peers.insert(peer_id, stored);
                }
            }
            evict_over_capacity(&mut peers, self.config.max_stored_peers);
        }
        self.save()?;
        Ok(true)
    }

    pub fn mark_failed(&self, peer_id: &PeerId) -> Result<()> {
        {
            let mut peers = self.peers.lock();
            if let Some(existing) = peers.get_mut(peer_id) {
                existing.record_contact(false);
            } else {
                return Ok(());
            }
        }
        self.save()
    }

    /// Non-expired peers, re-validated, sorted by descending reliability.
    pub fn all_peers(&self) -> Vec<StoredPeer> {
        let peers = self.peers.lock();
        let mut result: Vec<StoredPeer> = peers
            .values()
            .filter(|p| !p.is_expired() && !p.announcement.valid_reachability(false).is_empty())
            .cloned()
            .collect();
        result.sort_by(|a, b| b.reliability().partial_cmp(&a.reliability()).unwrap());
        result
    }

    pub fn remove(&self, peer_id: &PeerId) -> Result<()> {
        {
            let mut peers = self.peers.lock();
            peers.remove(peer_id);
        }
        self.save()
    }

    /// Drop expired peers and peers whose reachability becomes empty on
    /// re-validation.
    pub fn cleanup(&self) -> Result<usize> {
        let removed = {
            let mut peers = self.peers.lock();
            let before = peers.len();
            peers.retain(|_, p| {
                !p.is_expired()
                    && p.announcement
                        .reachability
                        .iter()
                        .any(|path| is_valid_path(path, false))
            });
            before - peers.len()
        };
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        let peers = self.peers.lock();
        let file = PeerFile {
            version: CURRENT_VERSION,
            saved_at: now_secs(),
            network_id: self.network_id.clone(),
            peers: peers
                .iter()
                .map(|(id, stored)| (id.to_hex(), stored.clone()))
                .collect(),
        };
        drop(peers);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&file)?;
        write_then_rename(&self.path, &json)
    }
}

fn load(path: &Path, network_id: &str) -> HashMap<PeerId, StoredPeer> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return HashMap::new(),
    };
    let file: PeerFile = match serde_json::from_slice(&bytes) {
        Ok(file) => file,
        Err(e) => {
            warn!("peers.json failed to parse ({e}); starting fresh");
            return HashMap::new();
        }
    };
    if file.version != CURRENT_VERSION {
        warn!("peers.json version mismatch (got {}); starting fresh", file.version);
        return HashMap::new();
    }
    if file.network_id != network_id {
        warn!("peers.json network id mismatch; starting fresh");
        return HashMap::new();
    }
    file.peers
        .into_iter()
        .filter_map(|(hex_id, stored)| match PeerId::from_hex(&hex_id) {
            Ok(id) => Some((id, stored)),
            Err(_) => None,
        })
        .collect()
}

/// Sort by reliability bucketed to the nearest 0.1 (so near ties fall back
/// to recency), then by `lastSeenAt`, keeping only the top `max` entries.
fn evict_over_capacity(peers: &mut HashMap<PeerId, StoredPeer>, max: usize) {
    if peers.len() <= max {
        return;
    }
    let mut ranked: Vec<(PeerId, f64, u64)> = peers
        .iter()
        .map(|(id, p)| ((*id), (p.reliability() * 10.0).round() / 10.0, p.last_seen_at))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(b.2.cmp(&a.2)));
    let keep: std::collections::HashSet<PeerId> =
        ranked.into_iter().take(max).map(|(id, _, _)| id).collect();
    peers.retain(|id, _| keep.contains(id));
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::IdentityKeypair;
    use crate::types::reachability::ReachabilityPath;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn announcement_with_endpoint(endpoint: &str) -> PeerAnnouncement {
        let keypair = IdentityKeypair::generate();
        let mut ann = PeerAnnouncement {
            peer_id: keypair.peer_id().unwrap(),
            public_key: keypair.public_key_bytes(),
            reachability: vec![ReachabilityPath::Direct {
                endpoint: endpoint.to_string(),
            }],
            capabilities: HashSet::new(),
            timestamp: now_secs(),
            ttl_seconds: 3600,
            signature: [0u8; 64],
        };
        ann.signature = keypair.sign(&ann.signing_bytes()).to_bytes();
        ann
    }

    #[test]
    fn update_then_all_peers_round_trips_through_disk() {
        let home = tempdir().unwrap();
        let store = PeerStore::open(home.path(), "net-1", PeerStoreConfig::default()).unwrap();

        let a = announcement_with_endpoint("203.0.113.1:9000");
        for _ in 0..9 {
            store.update(a.clone(), true).unwrap();
        }
        store.update(a.clone(), false).unwrap();

        let b = announcement_with_endpoint("203.0.113.2:9000");
        for _ in 0..9 {
            store.update(b.clone(), false).unwrap();
        }
        store.update(b.clone(), true).unwrap();

        let c = announcement_with_endpoint("203.0.113.3:9000");
        store.update(c.clone(), true).unwrap();
        store.update(c.clone(), false).unwrap();

        let reopened = PeerStore::open(home.path(), "net-1", PeerStoreConfig::default()).unwrap();
        let peers = reopened.all_peers();
        assert_eq!(peers.len(), 3);
        assert!((peers[0].reliability() - 0.9).abs() < 1e-9);
        assert!((peers[1].reliability() - 0.5).abs() < 1e-9);
        assert!((peers[2].reliability() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn update_rejects_announcement_with_no_valid_paths() {
        let home = tempdir().unwrap();
        let store = PeerStore::open(home.path(), "net-1", PeerStoreConfig::default()).unwrap();
        let ann = announcement_with_endpoint("127.0.0.1:9000");
        assert!(!store.update(ann, true).unwrap());
        assert!(store.all_peers().is_empty());
    }

    #[test]
    fn mismatched_network_id_on_disk_starts_fresh() {
        let home = tempdir().unwrap();
        {
            let store = PeerStore::open(home.path(), "net-a", PeerStoreConfig::default()).unwrap();
            store.update(announcement_with_endpoint("203.0.113.1:9000"), true).unwrap();
        }
        let path = home
            .path()
            .join(".omerta/mesh/networks/net-a/peers.json");
        let contents = std::fs::read_to_string(&path).unwrap();
        let doctored = contents.replace("\"net-a\"", "\"net-b\"");
        std::fs::write(&path, doctored).unwrap();

        let reloaded = load(&path, "net-a");
        assert!(reloaded.is_empty());
    }

    #[test]
    fn eviction_keeps_the_highest_reliability_set_at_capacity_plus_one() {
        let mut peers: HashMap<PeerId, StoredPeer> = HashMap::new();
        for i in 0..6u8 {
            let keypair = IdentityKeypair::generate();
            let mut ann = announcement_with_endpoint("203.0.113.9:9000");
            ann.peer_id = keypair.peer_id().unwrap();
            ann.public_key = keypair.public_key_bytes();
            ann.signature = keypair.sign(&ann.signing_bytes()).to_bytes();
            let mut stored = StoredPeer::new(ann);
            for _ in 0..i {
                stored.record_contact(true);
            }
            stored.record_contact(i == 0);
            peers.insert(stored.announcement.peer_id, stored);
        }
        evict_over_capacity(&mut peers, 5);
        assert_eq!(peers.len(), 5);
    }

    #[test]
    fn mark_failed_increments_only_failed_counter() {
        let home = tempdir().unwrap();
        let store = PeerStore::open(home.path(), "net-1", PeerStoreConfig::default()).unwrap();
        let ann = announcement_with_endpoint("203.0.113.1:9000");
        let id = ann.peer_id;
        store.update(ann, true).unwrap();
        store.mark_failed(&id).unwrap();
        let peers = store.all_peers();
        assert_eq!(peers[0].failed_contacts, 1);
        assert_eq!(peers[0].successful_contacts, 1);
    }
}
