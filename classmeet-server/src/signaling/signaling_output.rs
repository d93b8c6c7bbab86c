use async_trait::async_trait;
use classmeet_core::{ConnectionId, ServerMessage};

/// Implemented by whatever holds the live transports (WebSocket or
/// Socket.IO) so the broker can push messages to one connection.
///
/// Delivery is best-effort: a connection that is already gone is skipped
/// without an error reaching the sender.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn deliver(&self, to: &ConnectionId, msg: ServerMessage);
}
