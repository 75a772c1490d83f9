//! The ordered send-path strategy behind `ChannelProvider::send_on_channel`:
//! prefer a known direct endpoint, fall back to directory lookup, then
//! hole-punch coordination, then relay — skipping any path the
//! path-failure reporter currently considers broken.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{MeshError, Result};
use crate::pathfail::PathFailureReporter;
use crate::peer::PeerCache;
use crate::types::peer_id::PeerId;
use crate::types::reachability::ReachabilityPath;

/// The network-facing operations `send_on_channel` needs, abstracted so the
/// ordering logic is testable without a real UDP socket.
#[async_trait]
pub trait PathTransport: Send + Sync {
    /// Attempt to deliver `bytes` over `path`. Returns whether the
    /// datagram was transmitted (not whether it was acknowledged — the
    /// envelope protocol has no transport-level ack).
    async fn try_send(&self, path: &ReachabilityPath, bytes: &[u8]) -> bool;

    /// Ask a relay-capable peer to coordinate simultaneous hole punching
    /// toward `target`. Returns the path to try if coordination succeeded.
    async fn coordinate_hole_punch(&self, target: PeerId) -> Option<ReachabilityPath>;

    /// A relay-capable peer's reachability path, if any is known.
    async fn best_relay(&self) -> Option<ReachabilityPath>;

    /// Directory lookup: ask known peers where `target` can be reached.
    async fn directory_lookup(&self, target: PeerId) -> Option<ReachabilityPath>;
}

pub struct ChannelSender {
    cache: Arc<PeerCache>,
    path_failures: Arc<PathFailureReporter>,
    transport: Arc<dyn PathTransport>,
}

impl ChannelSender {
    pub fn new(
        cache: Arc<PeerCache>,
        path_failures: Arc<PathFailureReporter>,
        transport: Arc<dyn PathTransport>,
    ) -> Self {
        Self {
            cache,
            path_failures,
            transport,
        }
    }

    /// Implements §4.7's ordered strategy. The first successful
    /// transmission resolves the send; if every strategy is exhausted,
    /// returns `PeerUnreachable`.
    pub async fn send_on_channel(&self, bytes: &[u8], to_peer: PeerId) -> Result<()> {
        for path in self.candidate_paths(to_peer).await {
            if self.path_failures.is_path_failed(&to_peer, &path) {
                continue;
            }
            if self.transport.try_send(&path, bytes).await {
                return Ok(());
            }
        }
        Err(MeshError::PeerUnreachable(to_peer.to_string()))
    }

    /// Candidate paths in priority order: known direct endpoints (IPv6
    /// before IPv4), then a directory-discovered path, then a
    /// hole-punch-coordinated path, then the best available relay.
    async fn candidate_paths(&self, to_peer: PeerId) -> Vec<ReachabilityPath> {
        let mut direct: Vec<ReachabilityPath> = self
            .cache
            .get(&to_peer)
            .map(|a| a.valid_reachability(false))
            .unwrap_or_default()
            .into_iter()
            .filter(|p| matches!(p, ReachabilityPath::Direct { .. }))
            .collect();
        direct.sort_by_key(|p| std::cmp::Reverse(p.is_ipv6()));

        if !direct.is_empty() {
            return direct;
        }

        let mut candidates = Vec::new();
        if let Some(path) = self.transport.directory_lookup(to_peer).await {
            candidates.push(path);
        }
        if let Some(path) = self.transport.coordinate_hole_punch(to_peer).await {
            candidates.push(path);
        }
        if let Some(path) = self.transport.best_relay().await {
            candidates.push(path);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::IdentityKeypair;
    use crate::pathfail::PathFailureConfig;
    use crate::types::announcement::PeerAnnouncement;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn peer() -> PeerId {
        PeerId::derive(&[7u8; 32]).unwrap()
    }

    fn announce(peer_id: PeerId, endpoint: &str) -> PeerAnnouncement {
        let keypair = IdentityKeypair::generate();
        let mut ann = PeerAnnouncement {
            peer_id,
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
        // peer_id intentionally left mismatched with the signing key here
        // is not needed; tests only exercise path selection, not verify().
        ann
    }

    struct RecordingTransport {
        sent_to: Mutex<Vec<ReachabilityPath>>,
        fail_direct: bool,
    }

    #[async_trait]
    impl PathTransport for RecordingTransport {
        async fn try_send(&self, path: &ReachabilityPath, _bytes: &[u8]) -> bool {
            self.sent_to.lock().push(path.clone());
            !self.fail_direct
        }
        async fn coordinate_hole_punch(&self, _target: PeerId) -> Option<ReachabilityPath> {
            None
        }
        async fn best_relay(&self) -> Option<ReachabilityPath> {
            None
        }
        async fn directory_lookup(&self, _target: PeerId) -> Option<ReachabilityPath> {
            None
        }
    }

    #[tokio::test]
    async fn prefers_known_direct_endpoint() {
        let cache = Arc::new(PeerCache::new());
        let to_peer = peer();
        cache.insert(announce(to_peer, "203.0.113.9:9000"));
        let transport = Arc::new(RecordingTransport {
            sent_to: Mutex::new(Vec::new()),
            fail_direct: false,
        });
        let sender = ChannelSender::new(
            cache,
            Arc::new(PathFailureReporter::new(PathFailureConfig::default())),
            transport.clone(),
        );
        sender.send_on_channel(b"hello", to_peer).await.unwrap();
        assert_eq!(transport.sent_to.lock().len(), 1);
    }

    #[tokio::test]
    async fn no_known_path_and_no_fallback_is_peer_unreachable() {
        let cache = Arc::new(PeerCache::new());
        let transport = Arc::new(RecordingTransport {
            sent_to: Mutex::new(Vec::new()),
            fail_direct: true,
        });
        let sender = ChannelSender::new(
            cache,
            Arc::new(PathFailureReporter::new(PathFailureConfig::default())),
            transport,
        );
        let result = sender.send_on_channel(b"hello", peer()).await;
        assert!(matches!(result, Err(MeshError::PeerUnreachable(_))));
    }

    #[tokio::test]
    async fn a_path_reported_failed_is_skipped() {
        let cache = Arc::new(PeerCache::new());
        let to_peer = peer();
        cache.insert(announce(to_peer, "203.0.113.9:9000"));
        let path_failures = Arc::new(PathFailureReporter::new(PathFailureConfig::default()));
        path_failures.report_failure(
            to_peer,
            ReachabilityPath::Direct {
                endpoint: "203.0.113.9:9000".to_string(),
            },
        );
        let transport = Arc::new(RecordingTransport {
            sent_to: Mutex::new(Vec::new()),
            fail_direct: false,
        });
        let sender = ChannelSender::new(cache, path_failures, transport.clone());
        let result = sender.send_on_channel(b"hello", to_peer).await;
        assert!(matches!(result, Err(MeshError::PeerUnreachable(_))));
        assert!(transport.sent_to.lock().is_empty());
    }
}
