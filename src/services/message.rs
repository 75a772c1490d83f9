//! Message service: opaque byte delivery to `msg-inbox-<peerId>` with an
//! optional delivery receipt on `msg-receipt-<peerId>`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::peer_id::PeerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub message_id: Uuid,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: Uuid,
}

pub fn inbox_channel(peer_id: &PeerId) -> String {
    format!("msg-inbox-{peer_id}")
}

pub fn receipt_channel(peer_id: &PeerId) -> String {
    format!("msg-receipt-{peer_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_namespaced_per_peer() {
        let peer = PeerId::derive(&[2u8; 32]).unwrap();
        assert_eq!(inbox_channel(&peer), format!("msg-inbox-{peer}"));
        assert_eq!(receipt_channel(&peer), format!("msg-receipt-{peer}"));
    }

    #[test]
    fn delivered_message_round_trips_through_json() {
        let msg = DeliveredMessage {
            message_id: Uuid::new_v4(),
            bytes: vec![1, 2, 3],
        };
        let encoded = serde_json::to_vec(&msg).unwrap();
        let decoded: DeliveredMessage = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.message_id, msg.message_id);
        assert_eq!(decoded.bytes, msg.bytes);
    }
}
