//! Socket.IO transport.
//!
//! Speaks the event vocabulary browser clients built on `socket.io-client`
//! already use (`offer`, `answer`, `ice-candidate`, `chat-message`) and feeds
//! the same broker as the plain WebSocket route.

use crate::app::AppState;
use crate::room::BrokerCommand;
use classmeet_core::{ConnectionId, Negotiation, NegotiationKind, ServerMessage};
use serde::Deserialize;
use serde_json::{Value, json};
use socketioxide::extract::{Data, SocketRef, State};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const EVENT_JOIN: &str = "join-room";
pub const EVENT_LEAVE: &str = "leave-room";
pub const EVENT_OFFER: &str = "offer";
pub const EVENT_ANSWER: &str = "answer";
pub const EVENT_ICE: &str = "ice-candidate";
pub const EVENT_CHAT: &str = "chat-message";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomPayload {
    #[serde(default)]
    room_id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignalPayload {
    Addressed { to: ConnectionId, data: Value },
    Broadcast(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatPayload {
    text: String,
    #[serde(default)]
    sent_at: Option<u64>,
}

pub async fn on_connect(socket: SocketRef, state: State<AppState>) {
    let connection_id = ConnectionId::new();
    socket.extensions.insert(connection_id);

    // Handlers go in before anything async so early client events are not lost.
    socket.on(EVENT_JOIN, on_join_room);
    socket.on(EVENT_LEAVE, on_leave_room);
    socket.on(EVENT_OFFER, on_offer);
    socket.on(EVENT_ANSWER, on_answer);
    socket.on(EVENT_ICE, on_ice_candidate);
    socket.on(EVENT_CHAT, on_chat_message);
    socket.on_disconnect(on_disconnect);

    info!(%connection_id, sid = %socket.id, "Socket.IO connection");

    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(ServerMessage::Welcome { connection_id });
    let _ = tx.send(ServerMessage::IceConfig {
        ice_servers: state.ice_servers.as_ref().clone(),
    });
    state.service.add_connection(connection_id, tx);

    if state
        .broker
        .send(BrokerCommand::Connect { connection_id })
        .await
        .is_err()
    {
        error!(%connection_id, "Broker is down, dropping socket");
        state.service.remove_connection(&connection_id);
        let _ = socket.disconnect();
        return;
    }

    tokio::spawn(forward(socket, rx));
}

async fn forward(socket: SocketRef, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
    while let Some(msg) = rx.recv().await {
        let (event, payload) = encode(msg);
        if socket.emit(event, &payload).is_err() {
            debug!(sid = %socket.id, "socket closed, stopping writer");
            break;
        }
    }
}

/// Event name and JSON body for one outbound message.
pub fn encode(msg: ServerMessage) -> (&'static str, Value) {
    match msg {
        ServerMessage::Welcome { connection_id } => {
            ("welcome", json!({ "connectionId": connection_id }))
        }
        ServerMessage::IceConfig { ice_servers } => {
            ("ice-config", json!({ "iceServers": ice_servers }))
        }
        ServerMessage::Joined { room, peers } => {
            ("joined", json!({ "roomId": room, "peers": peers }))
        }
        ServerMessage::JoinRejected { reason } => ("join-rejected", json!({ "reason": reason })),
        ServerMessage::PeerJoined { peer } => ("peer-joined", json!(peer)),
        ServerMessage::PeerLeft { connection_id } => {
            ("peer-left", json!({ "connectionId": connection_id }))
        }
        ServerMessage::Signal { from, signal } => {
            let event = match signal.kind {
                NegotiationKind::Offer => EVENT_OFFER,
                NegotiationKind::Answer => EVENT_ANSWER,
                NegotiationKind::IceCandidate => EVENT_ICE,
            };
            (event, json!({ "from": from, "data": payload_to_value(signal.payload) }))
        }
        ServerMessage::Chat(chat) => (
            EVENT_CHAT,
            json!({ "from": chat.from, "text": chat.text, "sentAt": chat.sent_at }),
        ),
    }
}

/// Socket.IO clients send arbitrary JSON (usually an `RTCSessionDescription`
/// or `RTCIceCandidate`). Strings travel as-is, anything else as JSON text.
fn value_to_payload(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn payload_to_value(payload: String) -> Value {
    let looks_structured = matches!(payload.trim_start().chars().next(), Some('{' | '['));
    if looks_structured {
        if let Ok(value) = serde_json::from_str(&payload) {
            return value;
        }
    }
    Value::String(payload)
}

fn connection_id(socket: &SocketRef) -> Option<ConnectionId> {
    socket.extensions.get::<ConnectionId>()
}

async fn on_join_room(socket: SocketRef, state: State<AppState>, Data(raw): Data<Value>) {
    let Some(connection_id) = connection_id(&socket) else {
        return;
    };

    let payload = match raw {
        Value::String(room_id) => JoinRoomPayload {
            room_id,
            ..Default::default()
        },
        other => serde_json::from_value(other).unwrap_or_else(|e| {
            warn!(%connection_id, error = %e, "malformed join-room payload");
            JoinRoomPayload::default()
        }),
    };

    let _ = state
        .broker
        .send(BrokerCommand::Join {
            connection_id,
            room: payload.room_id,
            token: payload.token,
            meta: payload.meta,
        })
        .await;
}

async fn on_leave_room(socket: SocketRef, state: State<AppState>) {
    let Some(connection_id) = connection_id(&socket) else {
        return;
    };
    let _ = state.broker.send(BrokerCommand::Leave { connection_id }).await;
}

async fn relay(socket: &SocketRef, state: &AppState, kind: NegotiationKind, raw: SignalPayload) {
    let Some(connection_id) = connection_id(socket) else {
        return;
    };

    let (to, data) = match raw {
        SignalPayload::Addressed { to, data } => (Some(to), data),
        SignalPayload::Broadcast(data) => (None, data),
    };

    let signal = Negotiation {
        kind,
        payload: value_to_payload(data),
    };
    let _ = state
        .broker
        .send(BrokerCommand::Relay {
            connection_id,
            to,
            signal,
        })
        .await;
}

async fn on_offer(socket: SocketRef, state: State<AppState>, Data(raw): Data<SignalPayload>) {
    relay(&socket, &state, NegotiationKind::Offer, raw).await;
}

async fn on_answer(socket: SocketRef, state: State<AppState>, Data(raw): Data<SignalPayload>) {
    relay(&socket, &state, NegotiationKind::Answer, raw).await;
}

async fn on_ice_candidate(
    socket: SocketRef,
    state: State<AppState>,
    Data(raw): Data<SignalPayload>,
) {
    relay(&socket, &state, NegotiationKind::IceCandidate, raw).await;
}

async fn on_chat_message(socket: SocketRef, state: State<AppState>, Data(raw): Data<Value>) {
    let Some(connection_id) = connection_id(&socket) else {
        return;
    };

    let (text, sent_at) = match raw {
        Value::String(text) => (text, None),
        other => match serde_json::from_value::<ChatPayload>(other) {
            Ok(chat) => (chat.text, chat.sent_at),
            Err(e) => {
                warn!(%connection_id, error = %e, "malformed chat-message payload");
                return;
            }
        },
    };

    let _ = state
        .broker
        .send(BrokerCommand::Chat {
            connection_id,
            text,
            sent_at,
        })
        .await;
}

async fn on_disconnect(socket: SocketRef, state: State<AppState>) {
    let Some(connection_id) = connection_id(&socket) else {
        return;
    };

    info!(%connection_id, sid = %socket.id, "Socket.IO disconnected");
    state.service.remove_connection(&connection_id);
    let _ = state
        .broker
        .send(BrokerCommand::Disconnect { connection_id })
        .await;
}
