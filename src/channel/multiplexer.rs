//! Per-channel handler registry: dispatches incoming `ChannelData` to the
//! single handler registered for its channel, the way the rest of the mesh
//! core is exposed to higher layers as a `ChannelProvider`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::{MeshError, Result};
use crate::types::peer_id::PeerId;

pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// A channel handler receives the sender's peer id and the raw bytes sent
/// on the channel.
pub type ChannelHandler = Arc<dyn Fn(PeerId, Vec<u8>) + Send + Sync>;

/// `mesh-*` is reserved for infrastructure; the empty string is the
/// default channel; everything else must be alphanumeric plus `-_` and no
/// longer than 64 bytes.
pub fn validate_channel_name(channel: &str) -> Result<()> {
    if channel.len() > MAX_CHANNEL_NAME_LEN {
        return Err(MeshError::ChannelRegistrationFailed(format!(
            "channel name longer than {MAX_CHANNEL_NAME_LEN} bytes"
        )));
    }
    if channel.is_empty() {
        return Ok(());
    }
    if !channel
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(MeshError::ChannelRegistrationFailed(
            "channel name must be alphanumeric plus '-' or '_'".to_string(),
        ));
    }
    Ok(())
}

pub fn is_infrastructure_channel(channel: &str) -> bool {
    channel.starts_with("mesh-")
}

/// Maps channel names to a single registered handler. Handlers for the
/// same channel are not serialized by the multiplexer itself; a handler
/// that needs serialized access to its own state must provide its own
/// actor boundary.
#[derive(Default)]
pub struct Multiplexer {
    handlers: RwLock<HashMap<String, ChannelHandler>>,
    dropped_count: AtomicU64,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_channel(&self, channel: &str, handler: ChannelHandler) -> Result<()> {
        validate_channel_name(channel)?;
        self.handlers.write().insert(channel.to_string(), handler);
        Ok(())
    }

    pub fn off_channel(&self, channel: &str) {
        self.handlers.write().remove(channel);
    }

    /// Dispatch `bytes` from `from_peer` to the handler registered for
    /// `channel`. Unregistered channels are logged and dropped. A handler
    /// that panics is caught and logged; it never tears down the
    /// multiplexer.
    pub fn dispatch(&self, from_peer: PeerId, channel: &str, bytes: Vec<u8>) {
        let handler = self.handlers.read().get(channel).cloned();
        match handler {
            Some(handler) => {
                let result = catch_unwind(AssertUnwindSafe(|| handler(from_peer, bytes)));
                if result.is_err() {
                    error!("channel handler for {channel} panicked");
                }
            }
            None => {
                warn!("dropping message for unregistered channel {channel}");
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }
}
