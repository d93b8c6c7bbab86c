use crate::backend::RtcBackend;
use crate::engine::{CallEvent, CallManager, Deferred};
use classmeet_core::{ConnectionId, Negotiation, NegotiationKind, ServerMessage};
use tracing::{debug, info, warn};

impl<B: RtcBackend> CallManager<B> {
    pub async fn handle_server_message(&mut self, msg: ServerMessage) {
        if self.state.is_terminal() {
            debug!(?msg, "call is over, ignoring");
            return;
        }

        match msg {
            ServerMessage::Welcome { connection_id } => {
                info!(%connection_id, "connected to signaling server");
                self.local_id = Some(connection_id);
            }

            ServerMessage::IceConfig { ice_servers } => {
                info!("Received ICE Config: {} servers", ice_servers.len());
                self.ice_servers = ice_servers;
            }

            ServerMessage::Joined { room, peers } => {
                if self.room.as_ref().is_some_and(|current| *current != room) {
                    let stale: Vec<_> = self.sessions.keys().copied().collect();
                    for peer in stale {
                        self.close_session(&peer).await;
                    }
                    self.deferred.clear();
                }

                // Existing members offer to us; we only answer.
                info!(room = %room, peers = peers.len(), "joined");
                self.room = Some(room.clone());
                self.emit(CallEvent::Joined {
                    room,
                    local_id: self.local_id,
                });
            }

            ServerMessage::JoinRejected { reason } => {
                warn!(%reason, "join rejected");
                self.emit(CallEvent::JoinRejected { reason });
            }

            ServerMessage::PeerJoined { peer } => {
                let peer = peer.connection_id;
                self.emit(CallEvent::PeerJoined { peer });

                if self.media.is_some() {
                    self.initiate(peer).await;
                } else {
                    debug!(%peer, "media not ready, offer deferred");
                    self.deferred.push(Deferred::Initiate(peer));
                }
            }

            ServerMessage::PeerLeft { connection_id } => {
                info!(peer = %connection_id, "peer left");
                self.emit(CallEvent::PeerLeft {
                    peer: connection_id,
                });
                self.teardown_peer(connection_id).await;
            }

            ServerMessage::Signal { from, signal } => self.handle_negotiation(from, signal).await,

            ServerMessage::Chat(chat) => {
                if let Some(entry) = self.transcript.receive(chat) {
                    let entry = entry.clone();
                    self.emit(CallEvent::Chat { entry });
                }
            }
        }
    }

    async fn handle_negotiation(&mut self, from: ConnectionId, signal: Negotiation) {
        match signal.kind {
            NegotiationKind::Offer => {
                if self.media.is_some() {
                    info!(peer = %from, "Received Offer");
                    self.accept_offer(from, signal.payload, Vec::new()).await;
                } else {
                    debug!(peer = %from, "media not ready, offer queued");
                    self.deferred.retain(|d| !matches!(d, Deferred::Offer { from: f, .. } if *f == from));
                    self.deferred.push(Deferred::Offer {
                        from,
                        sdp: signal.payload,
                        candidates: Vec::new(),
                    });
                }
            }
            NegotiationKind::Answer => {
                info!(peer = %from, "Received Answer");
                self.accept_answer(from, &signal.payload).await;
            }
            NegotiationKind::IceCandidate => self.add_remote_candidate(from, &signal).await,
        }
    }
}
