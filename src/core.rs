//! The concrete node: wires identity, network key, peer cache, NAT
//! predictor, and path-failure reporter to the UDP transport and channel
//! multiplexer, exposing itself as a [`ChannelProvider`] to every
//! higher-level service and as an [`InfrastructureHandler`] to the
//! dispatch loop.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::channel::multiplexer::{validate_channel_name, ChannelHandler, Multiplexer};
use crate::channel::provider::ChannelProvider;
use crate::channel::sender::{ChannelSender, PathTransport};
use crate::envelope;
use crate::error::Result;
use crate::identity::keypair::IdentityKeypair;
use crate::nat::NatPredictor;
use crate::pathfail::PathFailureReporter;
use crate::peer::{PeerCache, PeerStore};
use crate::transport::{InfrastructureHandler, UdpTransport};
use crate::types::announcement::PeerAnnouncement;
use crate::types::envelope_header::EnvelopeHeader;
use crate::types::mesh_message::MeshMessage;
use crate::types::nat_type::NatType;
use crate::types::peer_id::PeerId;
use crate::types::reachability::ReachabilityPath;

const HOLE_PUNCH_COORDINATION_TIMEOUT: Duration = Duration::from_secs(3);

/// Builds and signs envelopes on behalf of a node's identity. Shared (via
/// `Arc`) between the node itself and its `PathTransport`, since hole-punch
/// coordination needs to address a relay directly from inside the send path
/// rather than only from the infrastructure dispatch side.
struct EnvelopeSigner {
    identity: IdentityKeypair,
    network_key: [u8; 32],
    machine_id: String,
}

impl EnvelopeSigner {
    fn peer_id(&self) -> Result<PeerId> {
        self.identity.peer_id()
    }

    fn build_header(&self, channel: &str, recipient: Option<PeerId>) -> Result<EnvelopeHeader> {
        Ok(EnvelopeHeader {
            network_hash: [0u8; 8],
            sender_peer_id: self.identity.peer_id()?,
            recipient_peer_id: recipient,
            channel_string: channel.to_string(),
            hop_count: 0,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            message_id: uuid::Uuid::new_v4(),
            machine_id: self.machine_id.clone(),
            public_key: [0u8; 32],
            signature: [0u8; 64],
        })
    }

    fn encode(&self, header: EnvelopeHeader, message: &MeshMessage) -> Result<Vec<u8>> {
        envelope::encode(&self.network_key, header, message, &self.identity)
    }
}

/// Matches an inbound `HolePunchResponse` back to the `coordinate_hole_punch`
/// call awaiting it, keyed by the target peer the original request was
/// about. Unmatched or late responses are dropped, same as `RequestTracker`.
#[derive(Default)]
struct HolePunchTracker {
    pending: parking_lot::Mutex<HashMap<PeerId, oneshot::Sender<String>>>,
}

impl HolePunchTracker {
    fn register(&self, target: PeerId) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(target, tx);
        rx
    }

    fn resolve(&self, target: PeerId, endpoint: String) {
        if let Some(sender) = self.pending.lock().remove(&target) {
            let _ = sender.send(endpoint);
        } else {
            warn!("hole-punch response for {target} with no pending coordination; dropped");
        }
    }

    fn cancel(&self, target: &PeerId) {
        self.pending.lock().remove(target);
    }
}

/// Bridges the ordered send-path strategy to a real UDP socket: each
/// candidate path is resolved to a wire address and the already-encoded
/// envelope handed to the socket. Directory lookup draws on the locally
/// cached peer set directly; hole-punch coordination asks the best
/// relay-capable peer to introduce us to the target and awaits its reply.
struct UdpPathTransport {
    transport: Arc<UdpTransport>,
    cache: Arc<PeerCache>,
    signer: Arc<EnvelopeSigner>,
    hole_punch_tracker: Arc<HolePunchTracker>,
}

#[async_trait]
impl PathTransport for UdpPathTransport {
    async fn try_send(&self, path: &ReachabilityPath, bytes: &[u8]) -> bool {
        let owned_endpoint;
        let endpoint = match path {
            ReachabilityPath::HolePunch { public_ip, local_port } => {
                let Ok(ip) = public_ip.parse::<std::net::IpAddr>() else {
                    return false;
                };
                owned_endpoint = SocketAddr::new(ip, *local_port).to_string();
                owned_endpoint.as_str()
            }
            _ => match path.endpoint() {
                Some(endpoint) => endpoint,
                None => return false,
            },
        };
        self.transport.send_to(endpoint, bytes).await.is_ok()
    }

    async fn coordinate_hole_punch(&self, target: PeerId) -> Option<ReachabilityPath> {
        let relay = self.best_relay_announcement()?;
        let relay_endpoint = relay.valid_reachability(false).into_iter().next()?;
        let relay_addr: SocketAddr = relay_endpoint.endpoint()?.parse().ok()?;
        let my_endpoint = self.transport.local_addr().ok()?.to_string();

        let rx = self.hole_punch_tracker.register(target);
        let message = MeshMessage::HolePunchRequest {
            target_peer_id: target,
            requester_endpoint: my_endpoint,
        };
        let Ok(header) = self.signer.build_header("", Some(relay.peer_id)) else {
            self.hole_punch_tracker.cancel(&target);
            return None;
        };
        let Ok(packet) = self.signer.encode(header, &message) else {
            self.hole_punch_tracker.cancel(&target);
            return None;
        };
        if self.transport.send_to(&relay_addr.to_string(), &packet).await.is_err() {
            self.hole_punch_tracker.cancel(&target);
            return None;
        }

        match tokio::time::timeout(HOLE_PUNCH_COORDINATION_TIMEOUT, rx).await {
            Ok(Ok(endpoint)) => {
                let (public_ip, local_port) = split_endpoint(&endpoint)?;
                Some(ReachabilityPath::HolePunch { public_ip, local_port })
            }
            _ => {
                self.hole_punch_tracker.cancel(&target);
                None
            }
        }
    }

    async fn best_relay(&self) -> Option<ReachabilityPath> {
        self.best_relay_announcement()
            .and_then(|a| a.valid_reachability(false).into_iter().next())
    }

    async fn directory_lookup(&self, target: PeerId) -> Option<ReachabilityPath> {
        self.cache
            .get(&target)
            .and_then(|a| a.valid_reachability(false).into_iter().next())
    }
}

impl UdpPathTransport {
    fn best_relay_announcement(&self) -> Option<PeerAnnouncement> {
        self.cache
            .all_announcements()
            .into_iter()
            .find(|a| a.capabilities.contains("relay"))
    }
}

fn split_endpoint(endpoint: &str) -> Option<(String, u16)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.trim_start_matches('[').trim_end_matches(']').to_string(), port))
}

/// A live mesh node: owns its identity and network key, the peer cache,
/// NAT predictor, and path-failure reporter, and exposes itself as a
/// [`ChannelProvider`] to every higher-level service.
pub struct MeshNode {
    signer: Arc<EnvelopeSigner>,
    transport: Arc<UdpTransport>,
    multiplexer: Arc<Multiplexer>,
    sender: ChannelSender,
    started_at_secs: u64,
    hole_punch_tracker: Arc<HolePunchTracker>,
    pub cache: Arc<PeerCache>,
    pub store: Arc<PeerStore>,
    pub nat_predictor: Arc<NatPredictor>,
    pub path_failures: Arc<PathFailureReporter>,
}

impl MeshNode {
    pub fn new(
        identity: IdentityKeypair,
        network_key: [u8; 32],
        transport: Arc<UdpTransport>,
        cache: Arc<PeerCache>,
        store: Arc<PeerStore>,
        nat_predictor: Arc<NatPredictor>,
        path_failures: Arc<PathFailureReporter>,
    ) -> Self {
        let signer = Arc::new(EnvelopeSigner {
            identity,
            network_key,
            machine_id: uuid::Uuid::new_v4().to_string(),
        });
        let hole_punch_tracker = Arc::new(HolePunchTracker::default());
        let multiplexer = Arc::new(Multiplexer::new());
        let path_transport: Arc<dyn PathTransport> = Arc::new(UdpPathTransport {
            transport: transport.clone(),
            cache: cache.clone(),
            signer: signer.clone(),
            hole_punch_tracker: hole_punch_tracker.clone(),
        });
        let sender = ChannelSender::new(cache.clone(), path_failures.clone(), path_transport);
        Self {
            signer,
            transport,
            multiplexer,
            sender,
            started_at_secs: now_secs(),
            hole_punch_tracker,
            cache,
            store,
            nat_predictor,
            path_failures,
        }
    }

    /// Persist a just-learned announcement to both the in-memory cache and
    /// the on-disk peer store, the way §3's Lifecycle and §4.4's bootstrap
    /// contract both call for. Verification already happened in the caller.
    fn remember_peer(&self, announcement: PeerAnnouncement) {
        self.cache.insert(announcement.clone());
        if let Err(e) = self.store.update(announcement, true) {
            warn!("failed to persist discovered peer: {e}");
        }
    }

    pub fn multiplexer(&self) -> Arc<Multiplexer> {
        self.multiplexer.clone()
    }

    pub fn network_key(&self) -> &[u8; 32] {
        &self.signer.network_key
    }

    pub fn uptime_seconds(&self) -> u64 {
        now_secs().saturating_sub(self.started_at_secs)
    }

    fn build_header(&self, channel: &str, recipient: Option<PeerId>) -> Result<EnvelopeHeader> {
        self.signer.build_header(channel, recipient)
    }

    /// Sign, encrypt, and fire-and-forget an infrastructure message at a
    /// known socket address. Used for direct replies (pong, peer-info)
    /// where the reply target is the datagram's own source address rather
    /// than a cached reachability path.
    async fn send_infra(&self, channel: &str, message: &MeshMessage, to: SocketAddr, recipient: Option<PeerId>) {
        self.send_infra_with_hop_count(channel, message, to, recipient, 0).await;
    }

    async fn send_infra_with_hop_count(
        &self,
        channel: &str,
        message: &MeshMessage,
        to: SocketAddr,
        recipient: Option<PeerId>,
        hop_count: u8,
    ) {
        let Ok(mut header) = self.build_header(channel, recipient) else {
            return;
        };
        header.hop_count = hop_count;
        match self.signer.encode(header, message) {
            Ok(packet) => {
                if let Err(e) = self.transport.send_to(&to.to_string(), &packet).await {
                    debug!("failed to send {channel} reply to {to}: {e}");
                }
            }
            Err(e) => debug!("failed to encode {channel} reply: {e}"),
        }
    }

    /// Re-broadcast a freshly-learned path failure to a bounded set of
    /// neighbors, with `hop_count` already incremented past the reporter's.
    /// Stops at `PathFailureReporter::max_propagation_hops` so a report
    /// cannot circulate the mesh indefinitely.
    async fn propagate_path_failure(
        &self,
        reported_by: PeerId,
        peer_id: PeerId,
        path: ReachabilityPath,
        failed_at: u64,
        hop_count: u8,
    ) {
        let message = MeshMessage::PathFailed {
            peer_id,
            path,
            failed_at,
        };
        let neighbors = self
            .cache
            .all_announcements()
            .into_iter()
            .filter(|a| a.peer_id != reported_by && a.peer_id != peer_id)
            .take(PATH_FAILURE_PROPAGATION_FANOUT);

        for neighbor in neighbors {
            let Some(endpoint) = neighbor.valid_reachability(false).into_iter().next().and_then(|p| p.endpoint().map(str::to_string))
            else {
                continue;
            };
            let Ok(addr) = endpoint.parse::<SocketAddr>() else {
                continue;
            };
            self.send_infra_with_hop_count("", &message, addr, Some(neighbor.peer_id), hop_count)
                .await;
        }
    }
}

/// How many neighbors a freshly-learned path failure is relayed to.
const PATH_FAILURE_PROPAGATION_FANOUT: usize = 3;

#[async_trait]
impl ChannelProvider for MeshNode {
    fn peer_id(&self) -> PeerId {
        self.signer
            .peer_id()
            .expect("identity keypair always derives a valid peer id")
    }

    async fn send_on_channel(&self, bytes: &[u8], to_peer: PeerId, channel: &str) -> Result<()> {
        validate_channel_name(channel)?;
        let header = self.build_header(channel, Some(to_peer))?;
        let message = MeshMessage::ChannelData {
            channel: channel.to_string(),
            bytes: bytes.to_vec(),
        };
        let packet = self.signer.encode(header, &message)?;
        self.sender.send_on_channel(&packet, to_peer).await
    }

    fn on_channel(&self, channel: &str, handler: ChannelHandler) -> Result<()> {
        self.multiplexer.on_channel(channel, handler)
    }

    fn off_channel(&self, channel: &str) {
        self.multiplexer.off_channel(channel);
    }
}

/// Routes infrastructure traffic arriving through [`crate::transport::dispatch_packet`]
/// into the cache, NAT predictor, and path-failure reporter this node owns,
/// replying where the protocol calls for one.
#[async_trait]
impl InfrastructureHandler for MeshNode {
    async fn on_ping(&self, from: PeerId, recent_peers: Vec<PeerId>, _their_nat_type: NatType, source: SocketAddr) {
        let prediction = self.nat_predictor.predict();
        let pong = MeshMessage::Pong {
            recent_peers,
            observed_endpoint: source.to_string(),
            your_nat_type: prediction.nat_type,
        };
        self.send_infra("", &pong, source, Some(from)).await;
    }

    async fn on_pong(&self, from: PeerId, _recent_peers: Vec<PeerId>, observed_endpoint: String, _my_nat_type: NatType) {
        self.nat_predictor.record_observation(from, &observed_endpoint, false);
    }

    async fn on_peer_list(&self, _from: PeerId, peers: Vec<PeerAnnouncement>) {
        for peer in peers {
            if peer.verify().is_ok() {
                self.remember_peer(peer);
            }
        }
    }

    async fn on_find_peer(&self, from: PeerId, target: PeerId, source: SocketAddr) {
        if let Some(announcement) = self.cache.get(&target) {
            if !announcement.is_expired() {
                let message = MeshMessage::PeerInfo { announcement };
                self.send_infra("", &message, source, Some(from)).await;
            }
        }
    }

    async fn on_peer_info(&self, _from: PeerId, announcement: PeerAnnouncement) {
        if announcement.verify().is_ok() {
            self.remember_peer(announcement);
        }
    }

    async fn on_path_failed(
        &self,
        from: PeerId,
        peer_id: PeerId,
        path: ReachabilityPath,
        failed_at: u64,
        hop_count: u8,
    ) {
        let newly_recorded = self.path_failures.handle_failure(peer_id, path.clone(), failed_at, from);
        if !newly_recorded || hop_count >= self.path_failures.max_propagation_hops() {
            return;
        }
        self.propagate_path_failure(from, peer_id, path, failed_at, hop_count + 1).await;
    }

    async fn on_gossip(&self, _from: PeerId, announcements: Vec<PeerAnnouncement>) {
        for announcement in announcements {
            if announcement.verify().is_ok() {
                self.remember_peer(announcement);
            }
        }
    }

    /// Either we are the requested target — in which case we reply
    /// directly to `requester_endpoint` with our own reachable endpoint —
    /// or we are the relay asked to introduce the two, in which case we
    /// forward the request to the target's last-known endpoint so it
    /// learns the requester's endpoint and can punch back directly.
    async fn on_hole_punch_request(&self, from: PeerId, target_peer_id: PeerId, requester_endpoint: String) {
        if target_peer_id == self.peer_id() {
            let Ok(requester_addr) = requester_endpoint.parse::<SocketAddr>() else {
                return;
            };
            let Ok(my_endpoint) = self.transport.local_addr() else {
                return;
            };
            let response = MeshMessage::HolePunchResponse {
                target_peer_id,
                target_endpoint: my_endpoint.to_string(),
            };
            self.send_infra("", &response, requester_addr, None).await;
            return;
        }

        let Some(target) = self.cache.get(&target_peer_id) else {
            debug!("hole punch request from {from} for unknown target {target_peer_id}");
            return;
        };
        let Some(path) = target.valid_reachability(false).into_iter().next() else {
            return;
        };
        let Some(endpoint) = path.endpoint() else {
            return;
        };
        let Ok(addr) = endpoint.parse::<SocketAddr>() else {
            return;
        };
        let message = MeshMessage::HolePunchRequest {
            target_peer_id,
            requester_endpoint,
        };
        self.send_infra("", &message, addr, Some(target_peer_id)).await;
    }

    /// The target's direct reply reaches us here; resolve whichever
    /// `coordinate_hole_punch` call is waiting on this peer.
    async fn on_hole_punch_response(&self, from: PeerId, target_peer_id: PeerId, target_endpoint: String) {
        let _ = from;
        self.hole_punch_tracker.resolve(target_peer_id, target_endpoint);
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
