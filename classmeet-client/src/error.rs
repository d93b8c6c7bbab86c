use classmeet_core::{ConnectionId, IdError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Camera or microphone could not be opened. Ends the call attempt.
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    #[error("invalid room id: {0}")]
    InvalidRoomId(#[from] IdError),

    #[error("not in a room")]
    NotJoined,

    #[error("call is closed")]
    CallClosed,

    #[error("negotiation with {peer} failed: {reason}")]
    Negotiation { peer: ConnectionId, reason: String },

    #[error("rtc backend: {0}")]
    Backend(String),

    #[error("signaling transport: {0}")]
    Transport(String),
}
