//! Peer identity derived from an Ed25519 public key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::PUBLIC_KEY_SIZE;
use crate::error::{MeshError, Result};

/// Lowercase hex of the first 8 bytes of SHA-256 of a peer's public key.
/// Always 16 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; 8]);

impl PeerId {
    /// Derive a PeerId from a raw 32-byte Ed25519 public key.
    pub fn derive(public_key: &[u8]) -> Result<Self> {
        if public_key.len() != PUBLIC_KEY_SIZE {
            return Err(MeshError::InvalidPublicKeySize);
        }
        let digest = Sha256::digest(public_key);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| MeshError::Other(e.to_string()))?;
        if bytes.len() != 8 {
            return Err(MeshError::Other(format!(
                "peer id must decode to 8 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_hex())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_and_16_hex_chars() {
        let key = [0x42u8; 32];
        let a = PeerId::derive(&key).unwrap();
        let b = PeerId::derive(&key).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 16);
    }

    #[test]
    fn derive_rejects_wrong_key_size() {
        assert!(PeerId::derive(&[0u8; 31]).is_err());
    }

    #[test]
    fn hex_round_trip() {
        let key = [0x7au8; 32];
        let id = PeerId::derive(&key).unwrap();
        let parsed = PeerId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }
}
