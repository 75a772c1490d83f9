//! Reachability paths: ways to contact a peer, and the validation rules
//! that keep obviously-useless endpoints out of announcements and the
//! peer store.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::types::peer_id::PeerId;

/// A way to reach a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReachabilityPath {
    Direct {
        endpoint: String,
    },
    Relay {
        relay_peer_id: PeerId,
        relay_endpoint: String,
    },
    HolePunch {
        public_ip: String,
        local_port: u16,
    },
}

impl ReachabilityPath {
    /// Hash used for path-failure dedup: `"direct:<endpoint>"`,
    /// `"relay:<relayId>:<relayEndpoint>"`, `"holepunch:<publicIp>:<localPort>"`.
    pub fn path_hash(&self) -> String {
        match self {
            Self::Direct { endpoint } => format!("direct:{endpoint}"),
            Self::Relay {
                relay_peer_id,
                relay_endpoint,
            } => format!("relay:{relay_peer_id}:{relay_endpoint}"),
            Self::HolePunch {
                public_ip,
                local_port,
            } => format!("holepunch:{public_ip}:{local_port}"),
        }
    }

    /// The endpoint to dial for this path, if it names one directly.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Direct { endpoint } => Some(endpoint),
            Self::Relay { relay_endpoint, .. } => Some(relay_endpoint),
            Self::HolePunch { .. } => None,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.endpoint()
            .and_then(parse_endpoint)
            .map(|addr| addr.is_ipv6())
            .unwrap_or(false)
    }
}

/// Parse `"host:port"` or `"[ipv6]:port"` into a SocketAddr. Returns `None`
/// for unparseable or hostname-based endpoints (hostnames are accepted as
/// opaque strings elsewhere but are not "valid" in the IP-address sense
/// this validator checks).
pub fn parse_endpoint(endpoint: &str) -> Option<SocketAddr> {
    endpoint.parse::<SocketAddr>().ok()
}

/// True if a reachability path is acceptable for storage/announcement:
/// not loopback, multicast, unspecified, or link-local (unless explicitly
/// permitted by the caller, e.g. for same-LAN testing).
pub fn is_valid_path(path: &ReachabilityPath, allow_link_local: bool) -> bool {
    match path {
        ReachabilityPath::HolePunch { public_ip, local_port } => {
            if *local_port == 0 {
                return false;
            }
            match public_ip.parse::<IpAddr>() {
                Ok(ip) => is_valid_ip(ip, allow_link_local),
                Err(_) => false,
            }
        }
        ReachabilityPath::Direct { endpoint } | ReachabilityPath::Relay { relay_endpoint: endpoint, .. } => {
            match parse_endpoint(endpoint) {
                Some(addr) => is_valid_ip(addr.ip(), allow_link_local),
                None => false,
            }
        }
    }
}

fn is_valid_ip(ip: IpAddr, allow_link_local: bool) -> bool {
    if ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() {
        return false;
    }
    let is_link_local = match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    };
    if is_link_local && !allow_link_local {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback_and_unspecified() {
        let loopback = ReachabilityPath::Direct {
            endpoint: "127.0.0.1:9000".to_string(),
        };
        assert!(!is_valid_path(&loopback, false));

        let unspecified = ReachabilityPath::Direct {
            endpoint: "0.0.0.0:9000".to_string(),
        };
        assert!(!is_valid_path(&unspecified, false));
    }

    #[test]
    fn rejects_multicast_and_link_local_by_default() {
        let multicast = ReachabilityPath::Direct {
            endpoint: "239.1.2.3:9000".to_string(),
        };
        assert!(!is_valid_path(&multicast, false));

        let link_local = ReachabilityPath::Direct {
            endpoint: "169.254.1.1:9000".to_string(),
        };
        assert!(!is_valid_path(&link_local, false));
        assert!(is_valid_path(&link_local, true));
    }

    #[test]
    fn accepts_routable_endpoints() {
        let direct = ReachabilityPath::Direct {
            endpoint: "203.0.113.4:51820".to_string(),
        };
        assert!(is_valid_path(&direct, false));

        let v6 = ReachabilityPath::Direct {
            endpoint: "[2001:db8::1]:9000".to_string(),
        };
        assert!(is_valid_path(&v6, false));
        assert!(v6.is_ipv6());
    }

    #[test]
    fn path_hash_matches_variant_format() {
        let direct = ReachabilityPath::Direct { endpoint: "1.2.3.4:9000".to_string() };
        assert_eq!(direct.path_hash(), "direct:1.2.3.4:9000");

        let hp = ReachabilityPath::HolePunch { public_ip: "1.2.3.4".to_string(), local_port: 5000 };
        assert_eq!(hp.path_hash(), "holepunch:1.2.3.4:5000");
    }
}
