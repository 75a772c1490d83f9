//! In-memory, unpersisted map from peer id to the latest announcement seen.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::announcement::PeerAnnouncement;
use crate::types::peer_id::PeerId;

#[derive(Default)]
pub struct PeerCache {
    announcements: RwLock<HashMap<PeerId, PeerAnnouncement>>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the announcement for its peer id.
    pub fn insert(&self, announcement: PeerAnnouncement) {
        let peer_id = announcement.peer_id;
        self.announcements.write().insert(peer_id, announcement);
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerAnnouncement> {
        self.announcements.read().get(peer_id).cloned()
    }

    /// All non-expired announcements currently cached.
    pub fn all_announcements(&self) -> Vec<PeerAnnouncement> {
        self.announcements
            .read()
            .values()
            .filter(|a| !a.is_expired())
            .cloned()
            .collect()
    }

    /// Drop expired entries; returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let mut announcements = self.announcements.write();
        let before = announcements.len();
        announcements.retain(|_, a| !a.is_expired());
        before - announcements.len()
    }

    pub fn len(&self) -> usize {
        self.announcements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::IdentityKeypair;
    use crate::types::reachability::ReachabilityPath;
    use std::collections::HashSet;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn signed(ttl: u64) -> PeerAnnouncement {
        let keypair = IdentityKeypair::generate();
        let mut ann = PeerAnnouncement {
            peer_id: keypair.peer_id().unwrap(),
            public_key: keypair.public_key_bytes(),
            reachability: vec![ReachabilityPath::Direct {
                endpoint: "203.0.113.9:9000".to_string(),
            }],
            capabilities: HashSet::new(),
            timestamp: SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs(),
            ttl_seconds: ttl,
            signature: [0u8; 64],
        };
        ann.signature = keypair.sign(&ann.signing_bytes()).to_bytes();
        ann
    }

    #[test]
    fn insert_then_get_round_trips() {
        let cache = PeerCache::new();
        let ann = signed(3600);
        let id = ann.peer_id;
        cache.insert(ann);
        assert!(cache.get(&id).is_some());
    }

    #[test]
    fn all_announcements_excludes_expired() {
        let cache = PeerCache::new();
        cache.insert(signed(3600));
        cache.insert(signed(0));
        assert_eq!(cache.all_announcements().len(), 1);
    }

    #[test]
    fn evict_expired_removes_only_expired_entries() {
        let cache = PeerCache::new();
        cache.insert(signed(3600));
        cache.insert(signed(0));
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
