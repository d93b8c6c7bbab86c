use classmeet_core::{ClientMessage, ConnectionId, Negotiation};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

/// Commands flowing from the transports into the broker.
#[derive(Debug)]
pub enum BrokerCommand {
    /// Transport handshake finished.
    Connect { connection_id: ConnectionId },

    Join {
        connection_id: ConnectionId,
        room: String,
        token: Option<String>,
        meta: Option<Value>,
    },

    Leave { connection_id: ConnectionId },

    /// Offer, answer or ICE candidate to relay to room peers.
    Relay {
        connection_id: ConnectionId,
        to: Option<ConnectionId>,
        signal: Negotiation,
    },

    Chat {
        connection_id: ConnectionId,
        text: String,
        sent_at: Option<u64>,
    },

    /// Transport is gone, explicit or not.
    Disconnect { connection_id: ConnectionId },

    Stats { reply: oneshot::Sender<BrokerStats> },

    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub rooms: usize,
    pub connections: usize,
}

impl BrokerCommand {
    /// Maps a frame received from `connection_id` onto the broker command it
    /// triggers.
    pub fn from_client(connection_id: ConnectionId, msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Join { room, token, meta } => BrokerCommand::Join {
                connection_id,
                room,
                token,
                meta,
            },
            ClientMessage::Leave => BrokerCommand::Leave { connection_id },
            ClientMessage::Signal { to, signal } => BrokerCommand::Relay {
                connection_id,
                to,
                signal,
            },
            ClientMessage::Chat { text, sent_at } => BrokerCommand::Chat {
                connection_id,
                text,
                sent_at,
            },
        }
    }
}
