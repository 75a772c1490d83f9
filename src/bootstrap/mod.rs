//! Drives a node from cold to connected: hard-coded bootstrap endpoints,
//! recovery from previously-persisted peers, and the directory lookup used
//! by both.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::constants::{MAX_DIRECTORY_LOOKUP_HOPS, MIN_BOOTSTRAP_NODE_TIMEOUT, MIN_DIRECTORY_LOOKUP_TIMEOUT};
use crate::peer::{PeerCache, PeerStore};
use crate::types::announcement::{PeerAnnouncement, StoredPeer};
use crate::types::nat_type::NatType;
use crate::types::peer_id::PeerId;

#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    pub nodes: Vec<String>,
    pub max_peers_per_node: usize,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            max_peers_per_node: 50,
            timeout: MIN_BOOTSTRAP_NODE_TIMEOUT,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct BootstrapOutcome {
    pub peers_discovered: usize,
    pub failed: Vec<(String, String)>,
}

impl BootstrapOutcome {
    pub fn succeeded(&self) -> bool {
        self.peers_discovered > 0
    }
}

/// The network operations bootstrap needs against a single endpoint or
/// already-known peer: ping-then-pong, a peer-list exchange, and the
/// directory `FindPeer` request.
#[async_trait]
pub trait BootstrapTransport: Send + Sync {
    async fn ping(&self, endpoint: &str, my_nat_type: NatType) -> std::io::Result<()>;
    async fn request_peer_list(&self, endpoint: &str) -> std::io::Result<Vec<PeerAnnouncement>>;
    async fn find_peer(&self, known_peer: PeerId, target: PeerId) -> Option<PeerAnnouncement>;
}

/// Contact every hard-coded endpoint in order, stopping early once
/// `max_peers_per_node` peers have been discovered. Every endpoint that
/// fails is recorded with its reason rather than aborting the whole run.
pub async fn bootstrap_cold(
    config: &BootstrapConfig,
    transport: &dyn BootstrapTransport,
    cache: &PeerCache,
    store: &PeerStore,
    my_nat_type: NatType,
) -> BootstrapOutcome {
    let mut outcome = BootstrapOutcome::default();
    for endpoint in &config.nodes {
        match contact_endpoint(transport, endpoint, my_nat_type.clone()).await {
            Ok(peers) => {
                let count = peers.len();
                for peer in peers {
                    cache.insert(peer.clone());
                    if let Err(e) = store.update(peer, true) {
                        warn!("failed to persist bootstrap-discovered peer: {e}");
                    }
                }
                outcome.peers_discovered += count;
            }
            Err(reason) => {
                warn!("bootstrap endpoint {endpoint} failed: {reason}");
                outcome.failed.push((endpoint.clone(), reason));
            }
        }
        if outcome.peers_discovered >= config.max_peers_per_node {
            break;
        }
    }
    outcome
}

async fn contact_endpoint(
    transport: &dyn BootstrapTransport,
    endpoint: &str,
    my_nat_type: NatType,
) -> Result<Vec<PeerAnnouncement>, String> {
    transport
        .ping(endpoint, my_nat_type)
        .await
        .map_err(|e| e.to_string())?;
    transport
        .request_peer_list(endpoint)
        .await
        .map_err(|e| e.to_string())
}

/// Try recovering from previously-persisted peers before falling back to
/// the hard-coded endpoints. Each non-expired stored peer is pinged on its
/// first reachability path; the first to respond is asked for further
/// peers. If every persisted peer fails and at least one hard-coded
/// bootstrap endpoint exists, falls back to [`bootstrap_cold`].
pub async fn bootstrap_from_persisted_peers(
    persisted: &[StoredPeer],
    config: &BootstrapConfig,
    transport: &dyn BootstrapTransport,
    cache: &PeerCache,
    store: &PeerStore,
    my_nat_type: NatType,
) -> BootstrapOutcome {
    let mut outcome = BootstrapOutcome::default();
    for stored in persisted {
        if stored.is_expired() {
            continue;
        }
        let Some(endpoint) = stored.announcement.reachability.first().and_then(|p| p.endpoint()) else {
            continue;
        };
        match contact_endpoint(transport, endpoint, my_nat_type.clone()).await {
            Ok(peers) => {
                let count = peers.len();
                for peer in peers {
                    cache.insert(peer.clone());
                    if let Err(e) = store.update(peer, true) {
                        warn!("failed to persist recovered peer: {e}");
                    }
                }
                outcome.peers_discovered += count;
            }
            Err(reason) => {
                outcome.failed.push((endpoint.to_string(), reason));
                continue;
            }
        }
        if outcome.peers_discovered > 0 {
            return outcome;
        }
    }

    if outcome.peers_discovered == 0 && !config.nodes.is_empty() {
        return bootstrap_cold(config, transport, cache, store, my_nat_type).await;
    }
    outcome
}

/// `findPeer`: consult the local cache first, then up to
/// [`MAX_DIRECTORY_LOOKUP_HOPS`] known peers (in cache order) via
/// `FindPeer` on a [`MIN_DIRECTORY_LOOKUP_TIMEOUT`]-per-hop basis. The
/// first valid, signature-verifying, non-expired announcement is cached
/// and returned.
pub async fn find_peer(
    target: PeerId,
    cache: &PeerCache,
    transport: &dyn BootstrapTransport,
) -> Option<PeerAnnouncement> {
    if let Some(cached) = cache.get(&target) {
        if !cached.is_expired() {
            return Some(cached);
        }
    }

    let known: Vec<PeerId> = cache
        .all_announcements()
        .into_iter()
        .map(|a| a.peer_id)
        .take(MAX_DIRECTORY_LOOKUP_HOPS)
        .collect();

    for known_peer in known {
        let lookup = tokio::time::timeout(
            MIN_DIRECTORY_LOOKUP_TIMEOUT,
            transport.find_peer(known_peer, target),
        )
        .await;
        if let Ok(Some(announcement)) = lookup {
            if announcement.verify().is_ok() && !announcement.is_expired() {
                cache.insert(announcement.clone());
                return Some(announcement);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use crate::identity::keypair::IdentityKeypair;
    use crate::peer::PeerStoreConfig;
    use crate::types::reachability::ReachabilityPath;

    fn open_store() -> (tempfile::TempDir, PeerStore) {
        let home = tempfile::tempdir().unwrap();
        let store = PeerStore::open(home.path(), "net-bootstrap", PeerStoreConfig::default()).unwrap();
        (home, store)
    }

    fn announce(endpoint: &str) -> PeerAnnouncement {
        let keypair = IdentityKeypair::generate();
        let mut ann = PeerAnnouncement {
            peer_id: keypair.peer_id().unwrap(),
            public_key: keypair.public_key_bytes(),
            reachability: vec![ReachabilityPath::Direct {
                endpoint: endpoint.to_string(),
            }],
            capabilities: HashSet::new(),
            timestamp: SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs(),
            ttl_seconds: 3600,
            signature: [0u8; 64],
        };
        ann.signature = keypair.sign(&ann.signing_bytes()).to_bytes();
        ann
    }

    struct MockTransport {
        good_endpoints: Vec<String>,
        peers_per_good_endpoint: usize,
        find_peer_hits: AtomicUsize,
    }

    #[async_trait]
    impl BootstrapTransport for MockTransport {
        async fn ping(&self, endpoint: &str, _my_nat_type: NatType) -> std::io::Result<()> {
            if self.good_endpoints.contains(&endpoint.to_string()) {
                Ok(())
            } else {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no response"))
            }
        }

        async fn request_peer_list(&self, _endpoint: &str) -> std::io::Result<Vec<PeerAnnouncement>> {
            Ok((0..self.peers_per_good_endpoint)
                .map(|i| announce(&format!("203.0.113.{}:9000", 10 + i)))
                .collect())
        }

        async fn find_peer(&self, _known_peer: PeerId, _target: PeerId) -> Option<PeerAnnouncement> {
            self.find_peer_hits.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[tokio::test]
    async fn cold_bootstrap_records_failures_and_keeps_going() {
        let config = BootstrapConfig {
            nodes: vec!["1.1.1.1:9000".to_string(), "2.2.2.2:9000".to_string()],
            max_peers_per_node: 100,
            ..BootstrapConfig::default()
        };
        let transport = MockTransport {
            good_endpoints: vec!["2.2.2.2:9000".to_string()],
            peers_per_good_endpoint: 3,
            find_peer_hits: AtomicUsize::new(0),
        };
        let cache = PeerCache::new();
        let (_home, store) = open_store();
        let outcome = bootstrap_cold(&config, &transport, &cache, &store, NatType::Unknown).await;
        assert_eq!(outcome.peers_discovered, 3);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "1.1.1.1:9000");
        assert!(outcome.succeeded());
        assert_eq!(store.all_peers().len(), 3);
    }

    #[tokio::test]
    async fn stops_early_once_max_peers_reached() {
        let config = BootstrapConfig {
            nodes: vec!["1.1.1.1:9000".to_string(), "2.2.2.2:9000".to_string()],
            max_peers_per_node: 2,
            ..BootstrapConfig::default()
        };
        let transport = MockTransport {
            good_endpoints: vec!["1.1.1.1:9000".to_string(), "2.2.2.2:9000".to_string()],
            peers_per_good_endpoint: 2,
            find_peer_hits: AtomicUsize::new(0),
        };
        let cache = PeerCache::new();
        let (_home, store) = open_store();
        let outcome = bootstrap_cold(&config, &transport, &cache, &store, NatType::Unknown).await;
        assert_eq!(outcome.peers_discovered, 2);
    }

    #[tokio::test]
    async fn find_peer_returns_cached_value_without_contacting_the_network() {
        let cache = PeerCache::new();
        let ann = announce("203.0.113.4:9000");
        let target = ann.peer_id;
        cache.insert(ann.clone());
        let transport = MockTransport {
            good_endpoints: vec![],
            peers_per_good_endpoint: 0,
            find_peer_hits: AtomicUsize::new(0),
        };
        let found = find_peer(target, &cache, &transport).await;
        assert!(found.is_some());
        assert_eq!(transport.find_peer_hits.load(Ordering::SeqCst), 0);
    }
}
