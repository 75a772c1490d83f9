//! Ed25519 identity keypair and detached signatures.

use base64::Engine as _;
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::constants::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use crate::error::{MeshError, Result};
use crate::types::peer_id::PeerId;

/// A 64-byte detached Ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn verify(&self, message: &[u8], public_key: &[u8]) -> Result<()> {
        if public_key.len() != PUBLIC_KEY_SIZE {
            return Err(MeshError::InvalidPublicKeySize);
        }
        let mut key_bytes = [0u8; PUBLIC_KEY_SIZE];
        key_bytes.copy_from_slice(public_key);
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| MeshError::InvalidPublicKeySize)?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.0);
        use ed25519_dalek::Verifier;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| MeshError::SignatureInvalid)
    }

    pub fn verify_base64_key(&self, message: &[u8], public_key_base64: &str) -> Result<()> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(public_key_base64)
            .map_err(|e| MeshError::Other(e.to_string()))?;
        self.verify(message, &key_bytes)
    }
}

/// An Ed25519 signing key and the operations the mesh core needs from it:
/// sign bytes or strings, export raw/base64 material, and derive a
/// [`PeerId`]. `SigningKey` zeroizes its own secret bytes on drop (the
/// `zeroize` feature of `ed25519-dalek`), so no hand-rolled `Drop` impl is
/// needed here.
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

impl IdentityKeypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_raw_private_key(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn from_base64_private_key(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| MeshError::Other(format!("invalid base64 private key: {e}")))?;
        if bytes.len() != 32 {
            return Err(MeshError::Other("private key must be 32 bytes".to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_raw_private_key(&arr))
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    pub fn sign_str(&self, message: &str) -> Signature {
        self.sign(message.as_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.public_key_bytes())
    }

    pub fn private_key_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.signing_key.to_bytes())
    }

    pub fn peer_id(&self) -> Result<PeerId> {
        PeerId::derive(&self.public_key_bytes())
    }
}
