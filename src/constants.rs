//! Protocol constants shared across the mesh core.

/// Unencrypted packet prefix: `"OMRT"` followed by the wire format version.
pub const PACKET_PREFIX: [u8; 5] = [0x4F, 0x4D, 0x52, 0x54, 0x02];

/// HKDF info string used to derive the envelope header key from a network key.
pub const HEADER_KEY_INFO: &[u8] = b"omerta-header-v2";

/// Fixed size of a raw Ed25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Fixed size of a raw Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Null-padded width of a peer id field inside the header.
pub const PEER_ID_FIELD_SIZE: usize = 44;

/// Null-padded width of the channel string field inside the header.
pub const CHANNEL_STRING_FIELD_SIZE: usize = 64;

/// Null-padded width of the machine id field inside the header.
pub const MACHINE_ID_FIELD_SIZE: usize = 36;

/// Header size when no recipient peer id is present: the sum of every
/// fixed-width field the header carries (network hash, flags, sender peer
/// id, channel hash, channel string, hop count, timestamp, message uuid,
/// machine id, public key, signature). The field widths above are each
/// individually normative; this total is derived from them rather than
/// hand-maintained.
pub const HEADER_SIZE_NO_RECIPIENT: usize = 8 + 1 + PEER_ID_FIELD_SIZE + 2 + CHANNEL_STRING_FIELD_SIZE
    + 1 + 8 + 16 + MACHINE_ID_FIELD_SIZE + PUBLIC_KEY_SIZE + SIGNATURE_SIZE;

/// Header size when a recipient peer id is present.
pub const HEADER_SIZE_WITH_RECIPIENT: usize = HEADER_SIZE_NO_RECIPIENT + PEER_ID_FIELD_SIZE;

/// AEAD nonce size (ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// AEAD authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Maximum channel string length, in bytes.
pub const MAX_CHANNEL_LEN: usize = 64;

/// Messages timestamped further than this into the past are replay-suspect.
pub const REPLAY_WINDOW_PAST: std::time::Duration = std::time::Duration::from_secs(120);

/// Messages timestamped further than this into the future are replay-suspect.
pub const REPLAY_WINDOW_FUTURE: std::time::Duration = std::time::Duration::from_secs(30);

/// Default maximum number of stored peers per network before eviction.
pub const DEFAULT_MAX_STORED_PEERS: usize = 500;

/// Default NAT predictor minimum observation count before a prediction is made.
pub const DEFAULT_MIN_NAT_OBSERVATIONS: usize = 2;

/// Default path-failure report rate-limit interval.
pub const DEFAULT_FAILURE_REPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Default path-failure memory window.
pub const DEFAULT_FAILURE_MEMORY: std::time::Duration = std::time::Duration::from_secs(300);

/// Default maximum number of remembered failures.
pub const DEFAULT_MAX_FAILURES: usize = 200;

/// Default maximum hop count for path-failure propagation.
pub const DEFAULT_MAX_PROPAGATION_HOPS: u8 = 2;

/// Minimum timeout for a single directory-lookup hop.
pub const MIN_DIRECTORY_LOOKUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Minimum timeout for a utility service request (health/message/cloister).
pub const MIN_SERVICE_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Minimum timeout when contacting a bootstrap node.
pub const MIN_BOOTSTRAP_NODE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Maximum number of known peers consulted per directory lookup.
pub const MAX_DIRECTORY_LOOKUP_HOPS: usize = 10;

/// Well-known infrastructure channels, precomputed for fast dispatch.
pub mod channels {
    pub const DEFAULT: &str = "";
    pub const MESH_PING: &str = "mesh-ping";
    pub const MESH_GOSSIP: &str = "mesh-gossip";
    pub const MESH_RELAY: &str = "mesh-relay";
    pub const MESH_HOLEPUNCH: &str = "mesh-holepunch";
    pub const MESH_DIR: &str = "mesh-dir";
    pub const HEALTH_REQUEST: &str = "health-request";
    pub const CLOISTER_NEGOTIATE: &str = "cloister-negotiate";
    pub const CLOISTER_DERIVE: &str = "cloister-derive";
    pub const CLOISTER_SHARE: &str = "cloister-share";
}
