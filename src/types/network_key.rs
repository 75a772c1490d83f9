//! Shared network secret and the network id derived from it.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MeshError, Result};

/// 32-byte symmetric secret shared by every member of a network, plus the
/// metadata carried in an invite URL.
#[derive(Clone, Serialize, Deserialize)]
pub struct NetworkKey {
    pub key: [u8; 32],
    pub name: String,
    pub bootstrap_endpoints: Vec<String>,
    pub created_at: u64,
}

impl NetworkKey {
    pub fn new(key: [u8; 32], name: impl Into<String>, bootstrap_endpoints: Vec<String>) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            key,
            name: name.into(),
            bootstrap_endpoints,
            created_at,
        }
    }

    /// Lowercase hex of the first 8 bytes of SHA-256 of the network key.
    pub fn network_id(&self) -> String {
        let digest = Sha256::digest(self.key);
        hex::encode(&digest[..8])
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let json = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| MeshError::Other(format!("invalid base64 network key: {e}")))?;
        let key: Self = serde_json::from_slice(&json)?;
        Ok(key)
    }

    /// `omerta://join/<base64(json(NetworkKey))>`
    pub fn to_invite_url(&self) -> Result<String> {
        Ok(format!("omerta://join/{}", self.encode()?))
    }

    pub fn from_invite_url(url: &str) -> Result<Self> {
        let encoded = url
            .strip_prefix("omerta://join/")
            .ok_or_else(|| MeshError::Other("not an omerta invite url".to_string()))?;
        Self::decode(encoded)
    }
}
