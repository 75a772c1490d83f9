//! The fixed-layout binary envelope header and the channel-hash function
//! used to address multiplexed channels cheaply.

use crate::constants::{
    CHANNEL_STRING_FIELD_SIZE, HEADER_SIZE_NO_RECIPIENT, HEADER_SIZE_WITH_RECIPIENT,
    MACHINE_ID_FIELD_SIZE, PEER_ID_FIELD_SIZE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
use crate::error::{MeshError, Result};
use crate::types::peer_id::PeerId;

const HAS_RECIPIENT_FLAG: u8 = 0b0000_0001;

/// Fixed-layout header carried at the front of every envelope, decrypted
/// and parsed before the payload is touched.
#[derive(Debug, Clone)]
pub struct EnvelopeHeader {
    pub network_hash: [u8; 8],
    pub sender_peer_id: PeerId,
    pub recipient_peer_id: Option<PeerId>,
    pub channel_string: String,
    pub hop_count: u8,
    pub timestamp_ms: u64,
    pub message_id: uuid::Uuid,
    pub machine_id: String,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub signature: [u8; SIGNATURE_SIZE],
}

impl EnvelopeHeader {
    pub fn channel_hash(&self) -> u16 {
        channel_hash(&self.channel_string)
    }

    pub fn encoded_len(&self) -> usize {
        if self.recipient_peer_id.is_some() {
            HEADER_SIZE_WITH_RECIPIENT
        } else {
            HEADER_SIZE_NO_RECIPIENT
        }
    }

    /// Serialize to the fixed 276/320-byte form described in §3/§6.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.network_hash);

        let mut flags = 0u8;
        if self.recipient_peer_id.is_some() {
            flags |= HAS_RECIPIENT_FLAG;
        }
        out.push(flags);

        push_padded(&mut out, self.sender_peer_id.to_hex().as_bytes(), PEER_ID_FIELD_SIZE);
        if let Some(recipient) = &self.recipient_peer_id {
            push_padded(&mut out, recipient.to_hex().as_bytes(), PEER_ID_FIELD_SIZE);
        }

        out.extend_from_slice(&self.channel_hash().to_be_bytes());

        let truncated_channel = truncate_channel(&self.channel_string);
        push_padded(&mut out, truncated_channel.as_bytes(), CHANNEL_STRING_FIELD_SIZE);

        out.push(self.hop_count);
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.extend_from_slice(self.message_id.as_bytes());
        push_padded(&mut out, self.machine_id.as_bytes(), MACHINE_ID_FIELD_SIZE);
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.signature);

        out
    }

    /// Parse a header from its fixed binary form. `data` must be exactly
    /// `HEADER_SIZE_NO_RECIPIENT` or `HEADER_SIZE_WITH_RECIPIENT` bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != HEADER_SIZE_NO_RECIPIENT && data.len() != HEADER_SIZE_WITH_RECIPIENT {
            return Err(MeshError::TruncatedPacket);
        }
        let mut offset = 0usize;
        let mut network_hash = [0u8; 8];
        network_hash.copy_from_slice(&data[offset..offset + 8]);
        offset += 8;

        let flags = data[offset];
        offset += 1;
        let has_recipient = flags & HAS_RECIPIENT_FLAG != 0;

        let sender_peer_id = read_peer_id(&data[offset..offset + PEER_ID_FIELD_SIZE])?;
        offset += PEER_ID_FIELD_SIZE;

        let recipient_peer_id = if has_recipient {
            let id = read_peer_id(&data[offset..offset + PEER_ID_FIELD_SIZE])?;
            offset += PEER_ID_FIELD_SIZE;
            Some(id)
        } else {
            None
        };

        let channel_hash = u16::from_be_bytes([data[offset], data[offset + 1]]);
        offset += 2;

        let channel_string = read_padded_string(&data[offset..offset + CHANNEL_STRING_FIELD_SIZE]);
        offset += CHANNEL_STRING_FIELD_SIZE;

        // Defense in depth: the hash travels alongside the string precisely
        // so callers can cross-check cheaply before touching the string.
        if channel_hash != self::channel_hash(&channel_string) {
            return Err(MeshError::Other("channel hash does not match channel string".to_string()));
        }

        let hop_count = data[offset];
        offset += 1;

        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&data[offset..offset + 8]);
        let timestamp_ms = u64::from_be_bytes(ts_bytes);
        offset += 8;

        let message_id = uuid::Uuid::from_slice(&data[offset..offset + 16])
            .map_err(|e| MeshError::Other(e.to_string()))?;
        offset += 16;

        let machine_id = read_padded_string(&data[offset..offset + MACHINE_ID_FIELD_SIZE]);
        offset += MACHINE_ID_FIELD_SIZE;

        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(&data[offset..offset + PUBLIC_KEY_SIZE]);
        offset += PUBLIC_KEY_SIZE;

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&data[offset..offset + SIGNATURE_SIZE]);

        Ok(Self {
            network_hash,
            sender_peer_id,
            recipient_peer_id,
            channel_string,
            hop_count,
            timestamp_ms,
            message_id,
            machine_id,
            public_key,
            signature,
        })
    }

    /// Bytes the signature covers: every header field except the signature
    /// itself, using the channel string rather than its hash.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut header = self.clone();
        header.signature = [0u8; SIGNATURE_SIZE];
        let encoded = header.encode();
        encoded[..encoded.len() - SIGNATURE_SIZE].to_vec()
    }

    pub fn increment_hop(&mut self) {
        self.hop_count = self.hop_count.saturating_add(1);
    }
}

fn push_padded(out: &mut Vec<u8>, bytes: &[u8], width: usize) {
    let take = bytes.len().min(width);
    out.extend_from_slice(&bytes[..take]);
    out.extend(std::iter::repeat(0u8).take(width - take));
}

fn read_padded_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn read_peer_id(bytes: &[u8]) -> Result<PeerId> {
    let s = read_padded_string(bytes);
    PeerId::from_hex(&s)
}

/// Channel strings longer than the field width are truncated identically
/// on both sides of the wire.
pub fn truncate_channel(channel: &str) -> String {
    if channel.len() <= CHANNEL_STRING_FIELD_SIZE {
        channel.to_string()
    } else {
        let mut truncated = channel.as_bytes()[..CHANNEL_STRING_FIELD_SIZE].to_vec();
        while std::str::from_utf8(&truncated).is_err() {
            truncated.pop();
        }
        String::from_utf8(truncated).unwrap_or_default()
    }
}

/// 16-bit FNV-1a, XOR-folded from 64 to 32 to 16 bits. The empty string
/// maps to 0; every other string maps to a non-zero value (if folding
/// happens to produce 0, it is remapped to 1).
pub fn channel_hash(channel: &str) -> u16 {
    if channel.is_empty() {
        return 0;
    }
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let truncated = truncate_channel(channel);
    let mut hash = FNV_OFFSET_BASIS;
    for byte in truncated.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    let folded32 = ((hash >> 32) ^ (hash & 0xFFFF_FFFF)) as u32;
    let folded16 = ((folded32 >> 16) ^ (folded32 & 0xFFFF)) as u16;
    if folded16 == 0 {
        1
    } else {
        folded16
    }
}
