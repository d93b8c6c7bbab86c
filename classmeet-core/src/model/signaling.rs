use crate::model::chat::ChatMessage;
use crate::model::connection::ConnectionId;
use crate::model::ice::{IceCandidate, IceServerConfig};
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationKind {
    Offer,
    Answer,
    IceCandidate,
}

/// One negotiation step. `payload` is relayed untouched by the server: SDP
/// text for offers and answers, a JSON-encoded [`IceCandidate`] otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiation {
    pub kind: NegotiationKind,
    pub payload: String,
}

impl Negotiation {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: NegotiationKind::Offer,
            payload: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: NegotiationKind::Answer,
            payload: sdp.into(),
        }
    }

    pub fn ice(candidate: &IceCandidate) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: NegotiationKind::IceCandidate,
            payload: serde_json::to_string(candidate)?,
        })
    }

    pub fn decode_ice(&self) -> Result<IceCandidate, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub connection_id: ConnectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        room: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        meta: Option<Value>,
    },
    Leave,
    Signal {
        #[serde(default)]
        to: Option<ConnectionId>,
        signal: Negotiation,
    },
    Chat {
        text: String,
        #[serde(default)]
        sent_at: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        connection_id: ConnectionId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    Joined {
        room: RoomId,
        peers: Vec<PeerInfo>,
    },
    JoinRejected {
        reason: String,
    },
    PeerJoined {
        peer: PeerInfo,
    },
    PeerLeft {
        connection_id: ConnectionId,
    },
    Signal {
        from: ConnectionId,
        signal: Negotiation,
    },
    Chat(ChatMessage),
}
