//! Explicit configuration records. Callers construct these once; nothing
//! here falls back to an ambient global or a dynamically-computed default.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::bootstrap::BootstrapConfig;
use crate::nat::NatPredictorConfig;
use crate::pathfail::PathFailureConfig;
use crate::peer::PeerStoreConfig;

/// Aggregates every component config plus the two things that are
/// per-process rather than per-component: the UDP bind address and an
/// override for the home directory persistence is scoped under (tests use
/// this to point at a temp directory instead of the real `$HOME`).
#[derive(Clone, Debug)]
pub struct MeshConfig {
    pub bind_addr: SocketAddr,
    pub home_dir: PathBuf,
    pub network_name: String,
    pub bootstrap: BootstrapConfig,
    pub peer_store: PeerStoreConfig,
    pub nat_predictor: NatPredictorConfig,
    pub path_failure: PathFailureConfig,
}

impl MeshConfig {
    pub fn new(bind_addr: SocketAddr, home_dir: PathBuf, network_name: impl Into<String>) -> Self {
        Self {
            bind_addr,
            home_dir,
            network_name: network_name.into(),
            bootstrap: BootstrapConfig::default(),
            peer_store: PeerStoreConfig::default(),
            nat_predictor: NatPredictorConfig::default(),
            path_failure: PathFailureConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_populates_every_component_with_its_default() {
        let config = MeshConfig::new("127.0.0.1:9000".parse().unwrap(), PathBuf::from("/tmp/omerta-test"), "test-net");
        assert_eq!(config.network_name, "test-net");
        assert_eq!(config.peer_store.max_stored_peers, crate::constants::DEFAULT_MAX_STORED_PEERS);
    }
}
