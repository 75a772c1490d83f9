//! Health service: a single request/response pair carried over the
//! multiplexer on `health-request` / `health-response-<peerId>`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub peer_count: usize,
    pub direct_connections: usize,
    pub relay_connections: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRequest {
    pub request_id: Uuid,
    pub include_metrics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub request_id: Uuid,
    pub status: HealthStatus,
    pub metrics: Option<HealthMetrics>,
}

/// The inputs a node has at hand when answering a health request: total
/// known peers, how many of those are direct vs. relayed, the current NAT
/// classification, and time since start.
pub struct HealthSnapshot {
    pub peer_count: usize,
    pub direct_connections: usize,
    pub relay_connections: usize,
    pub is_nat_symmetric: bool,
    pub uptime_seconds: u64,
}

/// Derives a coarse health status from a snapshot: unhealthy with no
/// peers at all, degraded with symmetric NAT and no direct connections or
/// very few peers, healthy otherwise.
pub fn derive_status(snapshot: &HealthSnapshot) -> HealthStatus {
    if snapshot.peer_count == 0 {
        return HealthStatus::Unhealthy;
    }
    if snapshot.is_nat_symmetric && snapshot.direct_connections == 0 && snapshot.relay_connections == 0 {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

pub fn channel_for_requester(channel_namespace: &str, peer_id: &crate::types::peer_id::PeerId) -> String {
    format!("{channel_namespace}-{peer_id}")
}

pub const HEALTH_RESPONSE_PREFIX: &str = "health-response";

pub fn health_response_channel(peer_id: &crate::types::peer_id::PeerId) -> String {
    channel_for_requester(HEALTH_RESPONSE_PREFIX, peer_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::peer_id::PeerId;

    #[test]
    fn no_peers_is_unhealthy() {
        let snapshot = HealthSnapshot {
            peer_count: 0,
            direct_connections: 0,
            relay_connections: 0,
            is_nat_symmetric: false,
            uptime_seconds: 10,
        };
        assert_eq!(derive_status(&snapshot), HealthStatus::Unhealthy);
    }

    #[test]
    fn symmetric_nat_with_no_connections_is_degraded() {
        let snapshot = HealthSnapshot {
            peer_count: 5,
            direct_connections: 0,
            relay_connections: 0,
            is_nat_symmetric: true,
            uptime_seconds: 10,
        };
        assert_eq!(derive_status(&snapshot), HealthStatus::Degraded);
    }

    #[test]
    fn peers_and_a_connection_is_healthy() {
        let snapshot = HealthSnapshot {
            peer_count: 5,
            direct_connections: 2,
            relay_connections: 0,
            is_nat_symmetric: false,
            uptime_seconds: 10,
        };
        assert_eq!(derive_status(&snapshot), HealthStatus::Healthy);
    }

    #[test]
    fn response_channel_is_namespaced_per_peer() {
        let peer = PeerId::derive(&[1u8; 32]).unwrap();
        assert_eq!(health_response_channel(&peer), format!("health-response-{peer}"));
    }
}
