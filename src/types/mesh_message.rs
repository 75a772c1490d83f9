//! The tagged union carried as an envelope's JSON payload.

use serde::{Deserialize, Serialize};

use crate::types::announcement::PeerAnnouncement;
use crate::types::nat_type::NatType;
use crate::types::peer_id::PeerId;
use crate::types::reachability::ReachabilityPath;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MeshMessage {
    /// Liveness probe, also used to bootstrap NAT prediction and peer
    /// exchange.
    Ping {
        recent_peers: Vec<PeerId>,
        my_nat_type: NatType,
    },

    /// Reply to `Ping`. `observed_endpoint` is the source address the
    /// responder saw the ping arrive from — the raw material the NAT
    /// predictor works from.
    Pong {
        recent_peers: Vec<PeerId>,
        observed_endpoint: String,
        your_nat_type: NatType,
    },

    /// Bulk peer exchange, sent in response to `PeerList` requests during
    /// bootstrap.
    PeerList { peers: Vec<PeerAnnouncement> },

    /// Directory lookup request: "does anyone know how to reach this peer?"
    FindPeer { peer_id: PeerId },

    /// Directory lookup response.
    PeerInfo { announcement: PeerAnnouncement },

    /// Application data multiplexed onto a named channel.
    ChannelData { channel: String, bytes: Vec<u8> },

    /// A reachability path recently failed for the sender.
    PathFailed {
        peer_id: PeerId,
        path: ReachabilityPath,
        failed_at: u64,
    },

    /// Unsolicited push of known-good announcements to a neighbor.
    Gossip { announcements: Vec<PeerAnnouncement> },

    /// Ask a relay-capable peer to coordinate simultaneous hole punching
    /// toward `target_peer_id`.
    HolePunchRequest {
        target_peer_id: PeerId,
        requester_endpoint: String,
    },

    /// The relay's reply, carrying the target's observed endpoint so both
    /// sides can attempt synchronized punching.
    HolePunchResponse {
        target_peer_id: PeerId,
        target_endpoint: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trips_through_json() {
        let msg = MeshMessage::Ping {
            recent_peers: vec![],
            my_nat_type: NatType::Unknown,
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: MeshMessage = serde_json::from_slice(&bytes).unwrap();
        match back {
            MeshMessage::Ping { recent_peers, my_nat_type } => {
                assert!(recent_peers.is_empty());
                assert_eq!(my_nat_type, NatType::Unknown);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn channel_data_round_trips_arbitrary_bytes() {
        let msg = MeshMessage::ChannelData {
            channel: "health-request".to_string(),
            bytes: vec![0, 1, 2, 255, 254],
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: MeshMessage = serde_json::from_slice(&bytes).unwrap();
        match back {
            MeshMessage::ChannelData { channel, bytes } => {
                assert_eq!(channel, "health-request");
                assert_eq!(bytes, vec![0, 1, 2, 255, 254]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
