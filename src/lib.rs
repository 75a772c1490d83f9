//! Omerta Mesh — a decentralized peer-to-peer overlay: a self-authenticating
//! envelope wire format, signed peer announcements, NAT-aware discovery, and
//! a multiplexed channel abstraction that higher-level services (health,
//! messaging, private-network negotiation) are built on top of.

pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod constants;
pub mod core;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod nat;
pub mod networks;
pub mod pathfail;
pub mod peer;
pub mod services;
pub mod transport;
pub mod types;

pub use config::MeshConfig;
pub use core::MeshNode;
pub use error::{MeshError, Result};
