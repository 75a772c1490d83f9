//! Cloister: the private-network negotiation service. Two peers exchange
//! ephemeral X25519 public keys on `cloister-negotiate` / `cloister-derive`
//! to agree on a fresh 32-byte network key without either side's long-term
//! identity key ever touching the wire, then one side may hand the
//! resulting [`NetworkKey`] to the other on `cloister-share`.

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::Result;
use crate::types::network_key::NetworkKey;

pub const CHANNEL_NEGOTIATE: &str = "cloister-negotiate";
pub const CHANNEL_DERIVE: &str = "cloister-derive";
pub const CHANNEL_SHARE: &str = "cloister-share";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiateMessage {
    pub ephemeral_public_key: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareMessage {
    pub network_key: NetworkKey,
}

/// A half-open negotiation: an ephemeral secret waiting to be combined
/// with the peer's public key. Holding this past a single
/// [`Self::derive_session_key`] call is impossible — the secret is
/// consumed by the Diffie-Hellman step, which is how forward secrecy is
/// enforced here rather than by a manual zeroize call.
pub struct PendingNegotiation {
    secret: EphemeralSecret,
    pub public_key: [u8; 32],
}

impl PendingNegotiation {
    pub fn begin() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let public_key = PublicKey::from(&secret).to_bytes();
        Self { secret, public_key }
    }

    pub fn negotiate_message(&self) -> NegotiateMessage {
        NegotiateMessage {
            ephemeral_public_key: self.public_key,
        }
    }

    /// Combine with the peer's ephemeral public key and derive a fresh
    /// 32-byte network key via HKDF-SHA256 over the shared secret, with
    /// `context` for domain separation between concurrent negotiations.
    /// Consumes `self`, so the ephemeral secret cannot be reused.
    pub fn derive_session_key(self, their_public_key: &[u8; 32], context: &str) -> [u8; 32] {
        let their_public = PublicKey::from(*their_public_key);
        let shared = self.secret.diffie_hellman(&their_public);
        derive_from_shared(shared.as_bytes(), context)
    }
}

fn derive_from_shared(shared_secret: &[u8; 32], context: &str) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut okm = [0u8; 32];
    hk.expand(context.as_bytes(), &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

pub fn encode_share(network_key: &NetworkKey) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&ShareMessage {
        network_key: network_key.clone(),
    })?)
}

pub fn decode_share(bytes: &[u8]) -> Result<NetworkKey> {
    let message: ShareMessage = serde_json::from_slice(bytes)?;
    Ok(message.network_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_session_key() {
        let alice = PendingNegotiation::begin();
        let bob = PendingNegotiation::begin();

        let alice_public = alice.public_key;
        let bob_public = bob.public_key;

        let alice_key = alice.derive_session_key(&bob_public, "cloister-v1");
        let bob_key = bob.derive_session_key(&alice_public, "cloister-v1");

        assert_eq!(alice_key, bob_key);
    }

    #[test]
    fn different_context_strings_yield_different_keys() {
        let shared_secret = [9u8; 32];
        let key_a = derive_from_shared(&shared_secret, "context-a");
        let key_b = derive_from_shared(&shared_secret, "context-b");
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn share_message_round_trips_a_network_key() {
        let nk = NetworkKey::new([0x44u8; 32], "cloister-net", vec![]);
        let bytes = encode_share(&nk).unwrap();
        let decoded = decode_share(&bytes).unwrap();
        assert_eq!(decoded.key, nk.key);
        assert_eq!(decoded.name, nk.name);
    }
}
