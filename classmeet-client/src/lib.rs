//! Meeting client: local media, a mesh of peer connections negotiated
//! through the signaling server, and the room chat.

pub mod backend;
pub mod chat;
pub mod engine;
pub mod error;

#[cfg(not(target_arch = "wasm32"))]
pub mod transport;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use backend::{LocalMedia, MediaConstraints, PeerEvent, PeerLink, RtcBackend, SdpKind};
pub use chat::{Origin, Transcript, TranscriptEntry};
pub use engine::{CallCommand, CallEvent, CallManager, CallState};
pub use error::ClientError;

#[cfg(not(target_arch = "wasm32"))]
pub use backend::native::{NativeBackend, NativeMedia, NativePeer};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::SignalingClient;
