//! Envelope wire format: encode/decode, signing, and replay defense.

pub mod codec;
pub mod replay;

pub use codec::{decode, encode, network_hash};
pub use replay::ReplayGuard;
