//! Utility services built on the channel multiplexer: health, message
//! delivery, and cloister (private-network negotiation). Each is a thin
//! contract layer — the actual request/response plumbing lives in
//! [`crate::channel`].

pub mod cloister;
pub mod health;
pub mod message;
