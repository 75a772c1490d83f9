//! The `ChannelProvider` ABI every node exposes to higher layers (§4.7,
//! §6): send on a channel, register/unregister a handler, and learn your
//! own peer id.

use async_trait::async_trait;

use crate::channel::multiplexer::ChannelHandler;
use crate::error::Result;
use crate::types::peer_id::PeerId;

#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn peer_id(&self) -> PeerId;
    async fn send_on_channel(&self, bytes: &[u8], to_peer: PeerId, channel: &str) -> Result<()>;
    fn on_channel(&self, channel: &str, handler: ChannelHandler) -> Result<()>;
    fn off_channel(&self, channel: &str);
}
