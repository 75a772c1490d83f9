//! Predicts a node's own NAT classification from the endpoints peers
//! report observing it at, rather than active STUN probing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::DEFAULT_MIN_NAT_OBSERVATIONS;
use crate::types::nat_type::NatType;
use crate::types::peer_id::PeerId;

#[derive(Clone, Copy, Debug)]
pub struct NatPredictorConfig {
    pub minimum_observations: usize,
}

impl Default for NatPredictorConfig {
    fn default() -> Self {
        Self {
            minimum_observations: DEFAULT_MIN_NAT_OBSERVATIONS,
        }
    }
}

#[derive(Clone, Debug)]
struct Observation {
    endpoint: SocketAddr,
    #[allow(dead_code)]
    timestamp: u64,
    #[allow(dead_code)]
    is_bootstrap_node: bool,
}

/// Emitted on classification or public-endpoint change. Default logger is
/// a no-op; callers that care about the history implement this trait.
pub trait NatEventLogger: Send + Sync {
    fn on_event(&self, event: NatEvent);
}

#[derive(Debug, Clone, PartialEq)]
pub enum NatEvent {
    TypeChanged { from: NatType, to: NatType },
    PublicEndpointChanged { endpoint: String },
}

struct NoopLogger;
impl NatEventLogger for NoopLogger {
    fn on_event(&self, _event: NatEvent) {}
}

pub struct NatPredictor {
    local_endpoint: Option<SocketAddr>,
    config: NatPredictorConfig,
    observations: Mutex<HashMap<PeerId, Observation>>,
    last_prediction: Mutex<NatType>,
    logger: Box<dyn NatEventLogger>,
}

/// Outcome of a prediction: the classification plus how many valid
/// observations it was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub nat_type: NatType,
    pub confidence: usize,
}

impl NatPredictor {
    pub fn new(local_endpoint: Option<SocketAddr>, config: NatPredictorConfig) -> Self {
        Self {
            local_endpoint,
            config,
            observations: Mutex::new(HashMap::new()),
            last_prediction: Mutex::new(NatType::Unknown),
            logger: Box::new(NoopLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn NatEventLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Record an endpoint a peer reported observing us at. Unparseable
    /// endpoints are dropped silently (they never become part of
    /// `validCount`).
    pub fn record_observation(&self, peer_id: PeerId, endpoint: &str, is_bootstrap_node: bool) {
        let Ok(parsed) = endpoint.parse::<SocketAddr>() else {
            return;
        };
        let observation = Observation {
            endpoint: parsed,
            timestamp: now_secs(),
            is_bootstrap_node,
        };
        self.observations.lock().insert(peer_id, observation);
        self.predict();
    }

    pub fn reset(&self) {
        self.observations.lock().clear();
        *self.last_prediction.lock() = NatType::Unknown;
    }

    pub fn predict(&self) -> Prediction {
        let observations = self.observations.lock();
        let valid_count = observations.len();

        let prediction = if valid_count < self.config.minimum_observations {
            Prediction {
                nat_type: NatType::Unknown,
                confidence: valid_count,
            }
        } else {
            let endpoints: Vec<SocketAddr> = observations.values().map(|o| o.endpoint).collect();
            let nat_type = classify(&endpoints, self.local_endpoint);
            Prediction {
                nat_type,
                confidence: valid_count,
            }
        };
        drop(observations);
        self.note_change(&prediction.nat_type);
        prediction
    }

    fn note_change(&self, new_type: &NatType) {
        let mut last = self.last_prediction.lock();
        if *last != *new_type {
            self.logger.on_event(NatEvent::TypeChanged {
                from: last.clone(),
                to: new_type.clone(),
            });
            if let NatType::Public { endpoint } | NatType::PortRestrictedCone { endpoint } = new_type {
                self.logger.on_event(NatEvent::PublicEndpointChanged {
                    endpoint: endpoint.clone(),
                });
            }
            *last = new_type.clone();
        }
    }
}

fn classify(endpoints: &[SocketAddr], local_endpoint: Option<SocketAddr>) -> NatType {
    if endpoints.is_empty() {
        return NatType::Unknown;
    }

    if let Some(local) = local_endpoint {
        if endpoints.iter().all(|e| *e == local) {
            return NatType::Public {
                endpoint: local.to_string(),
            };
        }
    }

    let first = endpoints[0];
    if endpoints.iter().all(|e| *e == first) {
        return NatType::PortRestrictedCone {
            endpoint: first.to_string(),
        };
    }

    // Same IP but different ports, or genuinely different IPs: either way
    // the external mapping is not stable enough for hole punching.
    NatType::Symmetric
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
