use crate::backend::{MediaConstraints, PeerEvent, RtcBackend};
use crate::chat::{Transcript, TranscriptEntry};
use classmeet_core::{ClientMessage, ConnectionId, IceCandidate, IceServerConfig, RoomId};
use futures::channel::mpsc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

mod handle_signal_impl;
mod media_impl;
mod negotiate_impl;
mod run_impl;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Capturing,
    Negotiating,
    Connected,
    Closed,
    Failed { reason: String },
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Closed | CallState::Failed { .. })
    }
}

/// What observers of a call get to see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    StateChanged { state: CallState },
    Joined { room: RoomId, local_id: Option<ConnectionId> },
    JoinRejected { reason: String },
    PeerJoined { peer: ConnectionId },
    PeerLeft { peer: ConnectionId },
    RemoteBound { peer: ConnectionId },
    RemoteReleased { peer: ConnectionId },
    Chat { entry: TranscriptEntry },
    /// A recoverable problem, e.g. a rejected room code.
    Error { message: String },
}

/// User actions fed to [`CallManager::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallCommand {
    Start(MediaConstraints),
    Join {
        room: String,
        token: Option<String>,
        meta: Option<Value>,
    },
    SendChat(String),
    SetAudioEnabled(bool),
    SetVideoEnabled(bool),
    EndCall,
}

/// Negotiation work that arrived before local media was ready.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Initiate(ConnectionId),
    /// Candidates trickled after the offer wait next to it.
    Offer {
        from: ConnectionId,
        sdp: String,
        candidates: Vec<IceCandidate>,
    },
}

/// One peer connection of the mesh.
pub(crate) struct PeerSession<P> {
    link: P,
    remote_description_set: bool,
    /// Remote candidates waiting for the remote description, in arrival order.
    pending_candidates: Vec<IceCandidate>,
    remote_bound: bool,
}

impl<P> PeerSession<P> {
    fn new(link: P) -> Self {
        Self {
            link,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            remote_bound: false,
        }
    }
}

/// Client side of a meeting: local media, one peer connection per remote
/// member, and the chat transcript.
///
/// Runtime agnostic: everything is driven through `&mut self` methods or
/// [`CallManager::run`], and output goes to `futures` channels, so the same
/// code runs under tokio and in the browser.
pub struct CallManager<B: RtcBackend> {
    backend: B,
    state: CallState,
    local_id: Option<ConnectionId>,
    room: Option<RoomId>,
    ice_servers: Vec<IceServerConfig>,

    media: Option<B::Media>,
    audio_enabled: bool,
    video_enabled: bool,

    sessions: HashMap<ConnectionId, PeerSession<B::Peer>>,
    deferred: Vec<Deferred>,
    transcript: Transcript,

    outbound: mpsc::UnboundedSender<ClientMessage>,
    peer_events_tx: mpsc::UnboundedSender<PeerEvent>,
    peer_events_rx: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    observers: Vec<mpsc::UnboundedSender<CallEvent>>,
}

impl<B: RtcBackend> CallManager<B> {
    /// `outbound` carries frames to the signaling transport.
    pub fn new(backend: B, outbound: mpsc::UnboundedSender<ClientMessage>) -> Self {
        let (peer_events_tx, peer_events_rx) = mpsc::unbounded();
        Self {
            backend,
            state: CallState::Idle,
            local_id: None,
            room: None,
            ice_servers: Vec::new(),
            media: None,
            audio_enabled: true,
            video_enabled: true,
            sessions: HashMap::new(),
            deferred: Vec::new(),
            transcript: Transcript::new(),
            outbound,
            peer_events_tx,
            peer_events_rx: Some(peer_events_rx),
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CallEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.observers.push(tx);
        rx
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn ice_servers(&self) -> &[IceServerConfig] {
        &self.ice_servers
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, peer: &ConnectionId) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn is_remote_bound(&self, peer: &ConnectionId) -> bool {
        self.sessions.get(peer).is_some_and(|s| s.remote_bound)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    fn set_state(&mut self, state: CallState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "call state");
        self.state = state.clone();
        self.emit(CallEvent::StateChanged { state });
    }

    fn emit(&mut self, event: CallEvent) {
        self.observers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    fn send(&self, msg: ClientMessage) {
        if self.outbound.unbounded_send(msg).is_err() {
            debug!("signaling transport gone, frame dropped");
        }
    }
}
