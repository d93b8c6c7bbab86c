use crate::backend::{PeerEvent, PeerLink, RtcBackend, SdpKind};
use crate::engine::{CallEvent, CallManager, CallState, Deferred, PeerSession};
use crate::error::ClientError;
use classmeet_core::{ClientMessage, ConnectionId, IceCandidate, Negotiation};
use tracing::{debug, info, warn};

impl Deferred {
    fn peer(&self) -> ConnectionId {
        match self {
            Deferred::Initiate(peer) => *peer,
            Deferred::Offer { from, .. } => *from,
        }
    }
}

impl<B: RtcBackend> CallManager<B> {
    pub(super) async fn serve_deferred(&mut self) {
        for item in std::mem::take(&mut self.deferred) {
            match item {
                Deferred::Initiate(peer) => self.initiate(peer).await,
                Deferred::Offer {
                    from,
                    sdp,
                    candidates,
                } => self.accept_offer(from, sdp, candidates).await,
            }
        }
    }

    async fn open_session(&mut self, peer: ConnectionId) -> Result<(), ClientError> {
        let Some(media) = &self.media else {
            return Err(ClientError::Backend("no local media".into()));
        };

        let link = self
            .backend
            .create_peer(peer, &self.ice_servers, media, self.peer_events_tx.clone())
            .await?;
        self.sessions.insert(peer, PeerSession::new(link));

        if self.state == CallState::Capturing {
            self.set_state(CallState::Negotiating);
        }
        Ok(())
    }

    /// Existing members offer to a newcomer.
    pub(super) async fn initiate(&mut self, peer: ConnectionId) {
        if self.sessions.contains_key(&peer) {
            debug!(%peer, "session already open, not offering again");
            return;
        }
        if let Err(e) = self.open_session(peer).await {
            self.negotiation_failed(peer, e).await;
            return;
        }

        let offer = match self.sessions.get(&peer) {
            Some(session) => session.link.create_offer().await,
            None => return,
        };

        match offer {
            Ok(sdp) => {
                info!(%peer, "sending offer");
                self.send(ClientMessage::Signal {
                    to: Some(peer),
                    signal: Negotiation::offer(sdp),
                });
            }
            Err(e) => self.negotiation_failed(peer, e).await,
        }
    }

    /// `early_candidates` arrived while the offer itself was waiting for
    /// local media; they are applied right after the offer.
    pub(super) async fn accept_offer(
        &mut self,
        from: ConnectionId,
        sdp: String,
        early_candidates: Vec<IceCandidate>,
    ) {
        if !self.sessions.contains_key(&from) {
            if let Err(e) = self.open_session(from).await {
                self.negotiation_failed(from, e).await;
                return;
            }
        }
        if let Some(session) = self.sessions.get_mut(&from) {
            session.pending_candidates.extend(early_candidates);
        }

        if let Err(e) = self
            .apply_remote_description(from, SdpKind::Offer, &sdp)
            .await
        {
            self.negotiation_failed(from, e).await;
            return;
        }

        let answer = match self.sessions.get(&from) {
            Some(session) => session.link.create_answer().await,
            None => return,
        };

        match answer {
            Ok(sdp) => {
                info!(peer = %from, "sending answer");
                self.send(ClientMessage::Signal {
                    to: Some(from),
                    signal: Negotiation::answer(sdp),
                });
            }
            Err(e) => self.negotiation_failed(from, e).await,
        }
    }

    pub(super) async fn accept_answer(&mut self, from: ConnectionId, sdp: &str) {
        if !self.sessions.contains_key(&from) {
            debug!(peer = %from, "answer without a session dropped");
            return;
        }

        if let Err(e) = self
            .apply_remote_description(from, SdpKind::Answer, sdp)
            .await
        {
            self.negotiation_failed(from, e).await;
        }
    }

    /// Applies the remote description, then every candidate that was
    /// waiting for it, in arrival order.
    async fn apply_remote_description(
        &mut self,
        peer: ConnectionId,
        kind: SdpKind,
        sdp: &str,
    ) -> Result<(), ClientError> {
        let Some(session) = self.sessions.get_mut(&peer) else {
            return Ok(());
        };

        session.link.set_remote_description(kind, sdp).await?;
        session.remote_description_set = true;

        let pending = std::mem::take(&mut session.pending_candidates);
        if !pending.is_empty() {
            debug!(%peer, count = pending.len(), "flushing buffered candidates");
        }
        for candidate in pending {
            if let Err(e) = session.link.add_ice_candidate(candidate).await {
                warn!(%peer, error = %e, "buffered candidate rejected");
            }
        }
        Ok(())
    }

    pub(super) async fn add_remote_candidate(&mut self, from: ConnectionId, signal: &Negotiation) {
        let candidate = match signal.decode_ice() {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(peer = %from, error = %e, "malformed ICE candidate");
                return;
            }
        };

        let Some(session) = self.sessions.get_mut(&from) else {
            let waiting = self.deferred.iter_mut().find_map(|d| match d {
                Deferred::Offer {
                    from: f,
                    candidates,
                    ..
                } if *f == from => Some(candidates),
                _ => None,
            });
            match waiting {
                Some(candidates) => candidates.push(candidate),
                None => debug!(peer = %from, "candidate without a session dropped"),
            }
            return;
        };

        if !session.remote_description_set {
            session.pending_candidates.push(candidate);
            return;
        }

        if let Err(e) = session.link.add_ice_candidate(candidate).await {
            warn!(peer = %from, error = %e, "candidate rejected");
        }
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate { peer, candidate } => {
                if !self.sessions.contains_key(&peer) {
                    return;
                }
                match Negotiation::ice(&candidate) {
                    Ok(signal) => self.send(ClientMessage::Signal {
                        to: Some(peer),
                        signal,
                    }),
                    Err(e) => warn!(%peer, error = %e, "failed to encode local candidate"),
                }
            }

            PeerEvent::RemoteTrack { peer } => {
                let Some(session) = self.sessions.get_mut(&peer) else {
                    debug!(%peer, "track for a closed session ignored");
                    return;
                };
                if session.remote_bound {
                    return;
                }
                session.remote_bound = true;

                self.backend.bind_remote(&peer);
                info!(%peer, "remote media bound");
                self.emit(CallEvent::RemoteBound { peer });
                if !self.state.is_terminal() {
                    self.set_state(CallState::Connected);
                }
            }

            PeerEvent::ConnectionLost { peer } => {
                info!(%peer, "peer connection lost");
                self.teardown_peer(peer).await;
            }
        }
    }

    /// Closes the link to `peer` and releases its playback. Returns whether
    /// a session existed.
    pub(super) async fn close_session(&mut self, peer: &ConnectionId) -> bool {
        let Some(session) = self.sessions.remove(peer) else {
            return false;
        };

        session.link.close().await;
        if session.remote_bound {
            self.backend.release_remote(peer);
            self.emit(CallEvent::RemoteReleased { peer: *peer });
        }
        true
    }

    /// Drops everything about `peer`; the call closes with its last session.
    pub(super) async fn teardown_peer(&mut self, peer: ConnectionId) {
        self.deferred.retain(|d| d.peer() != peer);

        let had_session = self.close_session(&peer).await;
        if had_session
            && self.sessions.is_empty()
            && matches!(self.state, CallState::Negotiating | CallState::Connected)
        {
            info!("last peer gone, closing call");
            self.finish();
        }
    }

    async fn negotiation_failed(&mut self, peer: ConnectionId, error: ClientError) {
        let error = ClientError::Negotiation {
            peer,
            reason: error.to_string(),
        };
        warn!("{}", error);
        self.emit(CallEvent::Error {
            message: error.to_string(),
        });
        self.teardown_peer(peer).await;
    }
}
