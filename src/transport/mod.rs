//! UDP transport adapter and dispatch loop: the one component allowed to
//! receive packets, feeding decoded messages to either the infrastructure
//! handlers or the channel multiplexer.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error};

use crate::channel::Multiplexer;
use crate::envelope::{self, ReplayGuard};
use crate::types::announcement::PeerAnnouncement;
use crate::types::envelope_header::EnvelopeHeader;
use crate::types::mesh_message::MeshMessage;
use crate::types::nat_type::NatType;
use crate::types::peer_id::PeerId;
use crate::types::reachability::ReachabilityPath;

const RECV_BUFFER_SIZE: usize = 2048;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding UDP socket on {addr}"))?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub async fn send_to(&self, endpoint: &str, bytes: &[u8]) -> Result<()> {
        let addr: SocketAddr = endpoint
            .parse()
            .with_context(|| format!("invalid endpoint {endpoint}"))?;
        self.socket.send_to(bytes, addr).await?;
        Ok(())
    }

    pub async fn recv(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// Infrastructure message handlers: everything that is not application
/// `ChannelData`, dispatched outside the channel multiplexer. Default
/// implementations are no-ops so a caller only needs to override what it
/// cares about.
#[async_trait::async_trait]
pub trait InfrastructureHandler: Send + Sync {
    async fn on_ping(&self, _from: PeerId, _recent_peers: Vec<PeerId>, _their_nat_type: NatType, _source: SocketAddr) {}
    async fn on_pong(&self, _from: PeerId, _recent_peers: Vec<PeerId>, _observed_endpoint: String, _my_nat_type: NatType) {}
    async fn on_peer_list(&self, _from: PeerId, _peers: Vec<PeerAnnouncement>) {}
    async fn on_find_peer(&self, _from: PeerId, _target: PeerId, _source: SocketAddr) {}
    async fn on_peer_info(&self, _from: PeerId, _announcement: PeerAnnouncement) {}
    async fn on_path_failed(
        &self,
        _from: PeerId,
        _peer_id: PeerId,
        _path: ReachabilityPath,
        _failed_at: u64,
        _hop_count: u8,
    ) {
    }
    async fn on_gossip(&self, _from: PeerId, _announcements: Vec<PeerAnnouncement>) {}
    async fn on_hole_punch_request(&self, _from: PeerId, _target_peer_id: PeerId, _requester_endpoint: String) {}
    async fn on_hole_punch_response(&self, _from: PeerId, _target_peer_id: PeerId, _target_endpoint: String) {}
}

/// Decode one inbound packet and route it: infrastructure variants go to
/// `infra`, `ChannelData` goes to the multiplexer. Decode/crypto failures
/// are logged at debug and discarded (UDP noise is normal) rather than
/// propagated.
pub async fn dispatch_packet(
    packet: &[u8],
    network_key: &[u8; 32],
    replay_guard: &ReplayGuard,
    infra: &dyn InfrastructureHandler,
    multiplexer: &Multiplexer,
    source: SocketAddr,
) {
    let decoded = envelope::decode(packet, network_key, replay_guard);
    let (header, message) = match decoded {
        Ok(pair) => pair,
        Err(e) => {
            debug!("discarding undecodable packet from {source}: {e}");
            return;
        }
    };
    route_message(header, message, infra, multiplexer, source).await;
}

async fn route_message(
    header: EnvelopeHeader,
    message: MeshMessage,
    infra: &dyn InfrastructureHandler,
    multiplexer: &Multiplexer,
    source: SocketAddr,
) {
    let from = header.sender_peer_id;
    match message {
        MeshMessage::Ping { recent_peers, my_nat_type } => {
            infra.on_ping(from, recent_peers, my_nat_type, source).await
        }
        MeshMessage::Pong {
            recent_peers,
            observed_endpoint,
            your_nat_type,
        } => infra.on_pong(from, recent_peers, observed_endpoint, your_nat_type).await,
        MeshMessage::PeerList { peers } => infra.on_peer_list(from, peers).await,
        MeshMessage::FindPeer { peer_id } => infra.on_find_peer(from, peer_id, source).await,
        MeshMessage::PeerInfo { announcement } => infra.on_peer_info(from, announcement).await,
        MeshMessage::ChannelData { channel, bytes } => {
            multiplexer.dispatch(from, &channel, bytes);
        }
        MeshMessage::PathFailed { peer_id, path, failed_at } => {
            infra.on_path_failed(from, peer_id, path, failed_at, header.hop_count).await
        }
        MeshMessage::Gossip { announcements } => infra.on_gossip(from, announcements).await,
        MeshMessage::HolePunchRequest {
            target_peer_id,
            requester_endpoint,
        } => infra.on_hole_punch_request(from, target_peer_id, requester_endpoint).await,
        MeshMessage::HolePunchResponse {
            target_peer_id,
            target_endpoint,
        } => infra.on_hole_punch_response(from, target_peer_id, target_endpoint).await,
    }
}

/// Runs [`UdpTransport::recv`] in a loop, dispatching each packet. Runs
/// until the socket errors or the task is cancelled; a malformed or
/// undeliverable packet never stops the loop.
pub async fn run_dispatch_loop(
    transport: Arc<UdpTransport>,
    network_key: [u8; 32],
    replay_guard: Arc<ReplayGuard>,
    infra: Arc<dyn InfrastructureHandler>,
    multiplexer: Arc<Multiplexer>,
) {
    loop {
        match transport.recv().await {
            Ok((packet, source)) => {
                dispatch_packet(&packet, &network_key, &replay_guard, infra.as_ref(), &multiplexer, source).await;
            }
            Err(e) => {
                error!("UDP receive failed: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::IdentityKeypair;
    use parking_lot::Mutex;
    use std::sync::Arc as StdArc;
    use uuid::Uuid;

    fn sample_header(signer: &IdentityKeypair, channel: &str) -> EnvelopeHeader {
        EnvelopeHeader {
            network_hash: [0u8; 8],
            sender_peer_id: signer.peer_id().unwrap(),
            recipient_peer_id: None,
            channel_string: channel.to_string(),
            hop_count: 0,
            timestamp_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_millis() as u64,
            message_id: Uuid::new_v4(),
            machine_id: Uuid::new_v4().to_string(),
            public_key: [0u8; 32],
            signature: [0u8; 64],
        }
    }

    #[derive(Default)]
    struct RecordingInfra {
        pings_seen: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl InfrastructureHandler for RecordingInfra {
        async fn on_ping(&self, _from: PeerId, _recent_peers: Vec<PeerId>, _their_nat_type: NatType, _source: SocketAddr) {
            *self.pings_seen.lock() += 1;
        }
    }

    #[tokio::test]
    async fn ping_routes_to_infra_handler_not_the_multiplexer() {
        let network_key = [5u8; 32];
        let signer = IdentityKeypair::generate();
        let header = sample_header(&signer, "mesh-ping");
        let message = MeshMessage::Ping {
            recent_peers: vec![],
            my_nat_type: NatType::Unknown,
        };
        let packet = envelope::encode(&network_key, header, &message, &signer).unwrap();

        let replay_guard = ReplayGuard::new();
        let infra = StdArc::new(RecordingInfra::default());
        let multiplexer = Multiplexer::new();
        let source: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        dispatch_packet(&packet, &network_key, &replay_guard, infra.as_ref(), &multiplexer, source).await;
        assert_eq!(*infra.pings_seen.lock(), 1);
        assert_eq!(multiplexer.dropped_count(), 0);
    }

    #[tokio::test]
    async fn channel_data_routes_to_the_multiplexer() {
        let network_key = [5u8; 32];
        let signer = IdentityKeypair::generate();
        let header = sample_header(&signer, "health-request");
        let message = MeshMessage::ChannelData {
            channel: "health-request".to_string(),
            bytes: vec![9, 9, 9],
        };
        let packet = envelope::encode(&network_key, header, &message, &signer).unwrap();

        let replay_guard = ReplayGuard::new();
        let infra = StdArc::new(RecordingInfra::default());
        let multiplexer = Multiplexer::new();
        let received = StdArc::new(Mutex::new(Vec::new()));
        let flag = received.clone();
        multiplexer
            .on_channel("health-request", StdArc::new(move |_from, bytes| flag.lock().extend(bytes)))
            .unwrap();
        let source: SocketAddr = "127.0.0.1:9001".parse().unwrap();

        dispatch_packet(&packet, &network_key, &replay_guard, infra.as_ref(), &multiplexer, source).await;
        assert_eq!(*received.lock(), vec![9, 9, 9]);
    }

    #[tokio::test]
    async fn garbage_packet_is_discarded_without_panicking() {
        let replay_guard = ReplayGuard::new();
        let infra = StdArc::new(RecordingInfra::default());
        let multiplexer = Multiplexer::new();
        let source: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        dispatch_packet(b"not a packet", &[0u8; 32], &replay_guard, infra.as_ref(), &multiplexer, source).await;
    }
}
