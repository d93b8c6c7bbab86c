//! Seam between the call engine and a concrete WebRTC stack.
//!
//! [`CallManager`](crate::CallManager) only talks to these traits; the
//! browser build plugs in `web-sys`, native builds plug in `webrtc`.

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

use crate::error::ClientError;
use async_trait::async_trait;
use classmeet_core::{ConnectionId, IceCandidate, IceServerConfig};
use futures::channel::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Callbacks fired by a peer link, funneled back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    LocalCandidate {
        peer: ConnectionId,
        candidate: IceCandidate,
    },
    /// A remote media track arrived; the backend keeps the stream.
    RemoteTrack { peer: ConnectionId },
    ConnectionLost { peer: ConnectionId },
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait RtcBackend {
    type Media: LocalMedia;
    type Peer: PeerLink;

    /// Opens camera and microphone.
    async fn capture(&self, constraints: MediaConstraints) -> Result<Self::Media, ClientError>;

    /// New connection object towards `peer` with the local tracks attached.
    async fn create_peer(
        &self,
        peer: ConnectionId,
        ice_servers: &[IceServerConfig],
        media: &Self::Media,
        events: PeerEventSender,
    ) -> Result<Self::Peer, ClientError>;

    /// Shows the remote stream of `peer` on a playback surface.
    fn bind_remote(&self, peer: &ConnectionId);

    fn release_remote(&self, peer: &ConnectionId);
}

/// The single local capture of a call.
pub trait LocalMedia {
    fn set_audio_enabled(&self, enabled: bool);
    fn set_video_enabled(&self, enabled: bool);
    /// Stops every track and releases the hardware.
    fn stop(&self);
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait PeerLink {
    /// Creates an offer, applies it locally and returns its SDP.
    async fn create_offer(&self) -> Result<String, ClientError>;

    /// Creates an answer, applies it locally and returns its SDP.
    async fn create_answer(&self) -> Result<String, ClientError>;

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<(), ClientError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ClientError>;

    async fn close(&self);

    /// Starts closing without waiting for it, for callers that cannot
    /// await such as `Drop`.
    fn close_detached(&self);
}
