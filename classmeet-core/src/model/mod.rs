mod chat;
mod connection;
mod ice;
mod room;
mod signaling;

pub use chat::ChatMessage;
pub use connection::ConnectionId;
pub use ice::{IceCandidate, IceServerConfig};
pub use room::RoomId;
pub use signaling::{ClientMessage, Negotiation, NegotiationKind, PeerInfo, ServerMessage};
