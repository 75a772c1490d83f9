//! Error kinds for the mesh core.
//!
//! Follows the manual enum + `Display` + `std::error::Error` pattern used
//! throughout the handshake layer rather than pulling in a derive macro
//! crate: each kind below corresponds to one of the families in the
//! error-handling design (decoding/crypto, routing, service, storage).

use std::fmt;

#[derive(Debug)]
pub enum MeshError {
    // --- Decoding / crypto ---
    InvalidPrefix,
    UnsupportedVersion(u8),
    TruncatedPacket,
    NetworkMismatch,
    HeaderAuthenticationFailed,
    PayloadAuthenticationFailed,
    SignatureInvalid,
    InvalidPublicKeySize,
    InvalidSignatureSize,
    PeerIdDerivationMismatch,
    ReplaySuspect,

    // --- Routing ---
    PeerUnreachable(String),
    NoRelaysAvailable,
    ConnectionFailed(String),
    Timeout(String),

    // --- Service ---
    ChannelRegistrationFailed(String),
    AlreadyRunning,
    NotStarted,
    InvalidResponse,
    Rejected(String),
    NoHandler(String),

    // --- Storage ---
    PersistenceFailed(String),
    VersionMismatch,
    NetworkIdMismatch,

    /// Escape hatch for errors bubbled up from a dependency (I/O, JSON, …).
    Other(String),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrefix => write!(f, "invalid packet prefix"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported wire version: {v}"),
            Self::TruncatedPacket => write!(f, "packet shorter than the minimum size"),
            Self::NetworkMismatch => write!(f, "network hash does not match the receiver's network"),
            Self::HeaderAuthenticationFailed => write!(f, "header authentication tag did not verify"),
            Self::PayloadAuthenticationFailed => write!(f, "payload authentication tag did not verify"),
            Self::SignatureInvalid => write!(f, "envelope signature did not verify"),
            Self::InvalidPublicKeySize => write!(f, "public key is not 32 bytes"),
            Self::InvalidSignatureSize => write!(f, "signature is not 64 bytes"),
            Self::PeerIdDerivationMismatch => write!(f, "derive(publicKey) != fromPeerId"),
            Self::ReplaySuspect => write!(f, "timestamp outside the replay window and message id already seen"),
            Self::PeerUnreachable(id) => write!(f, "peer unreachable: {id}"),
            Self::NoRelaysAvailable => write!(f, "no relay-capable peer available"),
            Self::ConnectionFailed(reason) => write!(f, "connection failed: {reason}"),
            Self::Timeout(op) => write!(f, "timed out: {op}"),
            Self::ChannelRegistrationFailed(reason) => write!(f, "channel registration failed: {reason}"),
            Self::AlreadyRunning => write!(f, "already running"),
            Self::NotStarted => write!(f, "not started"),
            Self::InvalidResponse => write!(f, "invalid response"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::NoHandler(channel) => write!(f, "no handler registered for channel {channel}"),
            Self::PersistenceFailed(reason) => write!(f, "persistence failed: {reason}"),
            Self::VersionMismatch => write!(f, "stored file version mismatch"),
            Self::NetworkIdMismatch => write!(f, "stored file network id mismatch"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for MeshError {}

impl From<std::io::Error> for MeshError {
    fn from(err: std::io::Error) -> Self {
        MeshError::PersistenceFailed(err.to_string())
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Other(format!("serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
