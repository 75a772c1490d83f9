//! Peer identity: Ed25519 keypairs, detached signatures, and the on-disk
//! store that keeps one identity per network forever.

pub mod keypair;
pub mod store;

pub use keypair::{IdentityKeypair, Signature};
pub use store::{migrate_legacy_peer_file, IdentityStore};
