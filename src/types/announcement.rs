//! Signed peer announcements and the stored-peer record the peer store
//! keeps on top of them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::{MeshError, Result};
use crate::types::peer_id::PeerId;
use crate::types::reachability::{is_valid_path, ReachabilityPath};

/// The part of an announcement that is covered by the signature. Kept as a
/// separate type (rather than skipping `signature` with a serde attribute)
/// so the canonical byte sequence signed and verified is never ambiguous.
#[derive(Clone, Serialize, Deserialize)]
struct UnsignedAnnouncement {
    peer_id: PeerId,
    public_key: [u8; PUBLIC_KEY_SIZE],
    reachability: Vec<ReachabilityPath>,
    capabilities: Vec<String>,
    timestamp: u64,
    ttl_seconds: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    pub peer_id: PeerId,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub reachability: Vec<ReachabilityPath>,
    pub capabilities: HashSet<String>,
    pub timestamp: u64,
    pub ttl_seconds: u64,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl PeerAnnouncement {
    /// Canonical byte sequence the signature is computed over: every field
    /// except `signature`, with capabilities sorted so the serialization is
    /// stable regardless of hash-set iteration order.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut capabilities: Vec<String> = self.capabilities.iter().cloned().collect();
        capabilities.sort();
        let unsigned = UnsignedAnnouncement {
            peer_id: self.peer_id,
            public_key: self.public_key,
            reachability: self.reachability.clone(),
            capabilities,
            timestamp: self.timestamp,
            ttl_seconds: self.ttl_seconds,
        };
        serde_json::to_vec(&unsigned).expect("announcement fields are always serializable")
    }

    pub fn is_expired(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now > self.timestamp + self.ttl_seconds
    }

    /// Validate the structural invariants: `derive(publicKey) == peerId`,
    /// the signature verifies, at least one reachability path survives
    /// endpoint validation.
    pub fn verify(&self) -> Result<()> {
        let derived = PeerId::derive(&self.public_key)?;
        if derived != self.peer_id {
            return Err(MeshError::PeerIdDerivationMismatch);
        }
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| MeshError::InvalidPublicKeySize)?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.signature);
        use ed25519_dalek::Verifier;
        verifying_key
            .verify(&self.signing_bytes(), &signature)
            .map_err(|_| MeshError::SignatureInvalid)?;
        if !self.reachability.iter().any(|p| is_valid_path(p, false)) {
            return Err(MeshError::Rejected("no valid reachability path".to_string()));
        }
        Ok(())
    }

    /// Reachability paths that survive endpoint validation.
    pub fn valid_reachability(&self, allow_link_local: bool) -> Vec<ReachabilityPath> {
        self.reachability
            .iter()
            .filter(|p| is_valid_path(p, allow_link_local))
            .cloned()
            .collect()
    }
}

/// A peer announcement extended with contact-history bookkeeping kept by
/// the on-disk peer store.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredPeer {
    pub announcement: PeerAnnouncement,
    pub last_seen_at: u64,
    pub successful_contacts: u64,
    pub failed_contacts: u64,
}

impl StoredPeer {
    pub fn new(announcement: PeerAnnouncement) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            announcement,
            last_seen_at: now,
            successful_contacts: 0,
            failed_contacts: 0,
        }
    }

    /// successful / (successful + failed), or 0.5 with zero contacts.
    pub fn reliability(&self) -> f64 {
        let total = self.successful_contacts + self.failed_contacts;
        if total == 0 {
            0.5
        } else {
            self.successful_contacts as f64 / total as f64
        }
    }

    pub fn record_contact(&mut self, successful: bool) {
        if successful {
            self.successful_contacts += 1;
        } else {
            self.failed_contacts += 1;
        }
        self.last_seen_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
    }

    pub fn is_expired(&self) -> bool {
        self.announcement.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::keypair::IdentityKeypair;

    fn signed_announcement(ttl: u64) -> PeerAnnouncement {
        let keypair = IdentityKeypair::generate();
        let peer_id = keypair.peer_id().unwrap();
        let mut announcement = PeerAnnouncement {
            peer_id,
            public_key: keypair.public_key_bytes(),
            reachability: vec![ReachabilityPath::Direct {
                endpoint: "203.0.113.4:51820".to_string(),
            }],
            capabilities: HashSet::new(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs(),
            ttl_seconds: ttl,
            signature: [0u8; SIGNATURE_SIZE],
        };
        let sig = keypair.sign(&announcement.signing_bytes());
        announcement.signature = sig.to_bytes();
        announcement
    }

    #[test]
    fn verify_accepts_well_formed_announcement() {
        let ann = signed_announcement(3600);
        assert!(ann.verify().is_ok());
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let mut ann = signed_announcement(3600);
        ann.signature[0] ^= 0xff;
        assert!(matches!(ann.verify(), Err(MeshError::SignatureInvalid)));
    }

    #[test]
    fn reliability_defaults_to_half_with_no_contacts() {
        let stored = StoredPeer::new(signed_announcement(3600));
        assert_eq!(stored.reliability(), 0.5);
    }

    #[test]
    fn reliability_tracks_contact_counters() {
        let mut stored = StoredPeer::new(signed_announcement(3600));
        for _ in 0..9 {
            stored.record_contact(true);
        }
        stored.record_contact(false);
        assert!((stored.reliability() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn expiry_follows_timestamp_plus_ttl() {
        let ann = signed_announcement(0);
        assert!(ann.is_expired());
    }
}
