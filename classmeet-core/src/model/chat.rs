use crate::model::connection::ConnectionId;
use serde::{Deserialize, Serialize};

/// A chat line as relayed to room peers. Never stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: ConnectionId,
    pub text: String,
    /// Unix time in milliseconds.
    pub sent_at: u64,
}
