//! The channel multiplexer: a `ChannelProvider` ABI shared by every
//! higher-level service (health, messaging, cloister), the ordered
//! send-path strategy, and the request/response client skeleton built on
//! top of it.

pub mod client;
pub mod multiplexer;
pub mod provider;
pub mod sender;

pub use client::RequestTracker;
pub use multiplexer::{validate_channel_name, ChannelHandler, Multiplexer};
pub use provider::ChannelProvider;
pub use sender::{ChannelSender, PathTransport};
