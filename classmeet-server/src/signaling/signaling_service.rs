use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use classmeet_core::{ConnectionId, ServerMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound queues of every live connection, whatever its transport.
///
/// Each connection has its own FIFO channel, drained by that connection's
/// writer task, so messages to one peer keep their send order.
#[derive(Clone, Default)]
pub struct SignalingService {
    connections: Arc<DashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl SignalingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(
        &self,
        connection_id: ConnectionId,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        self.connections.insert(connection_id, tx);
    }

    pub fn remove_connection(&self, connection_id: &ConnectionId) {
        self.connections.remove(connection_id);
    }

    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn send_to(&self, connection_id: &ConnectionId, msg: ServerMessage) {
        let Some(tx) = self.connections.get(connection_id) else {
            debug!(%connection_id, "target gone, message dropped");
            return;
        };
        if tx.send(msg).is_err() {
            debug!(%connection_id, "writer closed, message dropped");
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn deliver(&self, to: &ConnectionId, msg: ServerMessage) {
        self.send_to(to, msg);
    }
}
