//! Signaling server for ClassMeet video meetings.
//!
//! Clients connect over a plain WebSocket (`/ws`) or Socket.IO, join a room
//! by meeting code and exchange offers, answers, ICE candidates and chat
//! lines with the other members. Media never passes through the server.

pub mod app;
pub mod config;
pub mod error;
pub mod room;
pub mod signaling;
pub mod telemetry;

pub use app::{App, AppState, build_app, build_router};
pub use config::{LogFormat, ServerConfig};
pub use error::{BrokerClosed, JoinError};
pub use room::{
    BearerTokenGuard, Broker, BrokerCommand, BrokerHandle, BrokerStats, JoinGuard, MeetingClaims,
    OpenAccess, RoomRegistry,
};
pub use signaling::{SignalingOutput, SignalingService, ws_handler};
