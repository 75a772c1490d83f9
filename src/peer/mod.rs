//! Peer discovery state: an in-memory cache and a network-scoped,
//! persisted store built on top of it.

pub mod cache;
pub mod store;

pub use cache::PeerCache;
pub use store::{PeerStore, PeerStoreConfig};
