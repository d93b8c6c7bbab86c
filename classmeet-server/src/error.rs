use classmeet_core::{IdError, RoomId};
use thiserror::Error;

/// Why a join was refused. Always recoverable: the connection stays
/// unjoined and may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("invalid room id: {0}")]
    InvalidRoomId(#[from] IdError),

    #[error("room {room} is full ({max} members)")]
    RoomFull { room: RoomId, max: usize },

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("signaling broker is no longer running")]
pub struct BrokerClosed;
