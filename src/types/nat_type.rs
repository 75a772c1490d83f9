//! NAT classification shared between mesh messages and the predictor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NatType {
    /// Not enough observations yet.
    Unknown,
    /// Directly reachable at the local bind endpoint.
    Public { endpoint: String },
    /// Port-restricted cone NAT; source port is stable across destinations.
    /// The predictor cannot distinguish full-cone from port-restricted-cone
    /// without active probing, so both collapse to this variant.
    PortRestrictedCone { endpoint: String },
    /// Allocates a different external mapping per destination; hole
    /// punching is not expected to work.
    Symmetric,
}
