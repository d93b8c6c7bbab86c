use crate::backend::{LocalMedia, MediaConstraints, RtcBackend};
use crate::engine::{CallEvent, CallManager, CallState};
use crate::error::ClientError;
use classmeet_core::{ClientMessage, RoomId};
use serde_json::Value;
use tracing::{info, warn};

impl<B: RtcBackend> CallManager<B> {
    /// Opens camera and microphone. A failure is terminal for this call.
    ///
    /// Peers and offers that showed up while waiting are served once the
    /// media is available.
    pub async fn start(&mut self, constraints: MediaConstraints) -> Result<(), ClientError> {
        if self.state.is_terminal() {
            return Err(ClientError::CallClosed);
        }
        if self.media.is_some() {
            return Ok(());
        }

        self.set_state(CallState::Capturing);

        match self.backend.capture(constraints).await {
            Ok(media) => {
                media.set_audio_enabled(self.audio_enabled);
                media.set_video_enabled(self.video_enabled);
                self.media = Some(media);
                info!(deferred = self.deferred.len(), "local media captured");

                self.serve_deferred().await;
                Ok(())
            }
            Err(e) => {
                let err = match e {
                    ClientError::MediaAccessDenied(_) => e,
                    other => ClientError::MediaAccessDenied(other.to_string()),
                };
                warn!(error = %err, "media capture failed");

                self.deferred.clear();
                self.leave_room();
                self.set_state(CallState::Failed {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Asks the server to join `room`. Confirmation arrives as `joined`.
    pub fn join(
        &mut self,
        room: &str,
        token: Option<String>,
        meta: Option<Value>,
    ) -> Result<(), ClientError> {
        if self.state.is_terminal() {
            return Err(ClientError::CallClosed);
        }

        let room = RoomId::parse(room)?;
        info!(room = %room, "joining");
        self.send(ClientMessage::Join {
            room: room.into(),
            token,
            meta,
        });
        Ok(())
    }

    pub fn send_chat(&mut self, text: &str) -> Result<(), ClientError> {
        if self.room.is_none() {
            return Err(ClientError::NotJoined);
        }

        if let Some((entry, msg)) = self.transcript.send(text) {
            self.send(msg);
            self.emit(CallEvent::Chat { entry });
        }
        Ok(())
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
        if let Some(media) = &self.media {
            media.set_audio_enabled(enabled);
        }
    }

    pub fn set_video_enabled(&mut self, enabled: bool) {
        self.video_enabled = enabled;
        if let Some(media) = &self.media {
            media.set_video_enabled(enabled);
        }
    }

    /// Hangs up: closes every peer link, releases local media and leaves
    /// the room. Safe to call more than once.
    pub async fn end_call(&mut self) {
        let peers: Vec<_> = self.sessions.keys().copied().collect();
        for peer in peers {
            self.close_session(&peer).await;
        }
        self.finish();
    }

    pub(super) fn finish(&mut self) {
        self.deferred.clear();
        self.release_media();
        self.leave_room();
        if !matches!(self.state, CallState::Failed { .. }) {
            self.set_state(CallState::Closed);
        }
    }

    fn release_media(&mut self) {
        if let Some(media) = self.media.take() {
            media.stop();
            info!("local media released");
        }
    }

    fn leave_room(&mut self) {
        if let Some(room) = self.room.take() {
            info!(room = %room, "leaving");
            self.send(ClientMessage::Leave);
        }
    }
}

impl<B: RtcBackend> Drop for CallManager<B> {
    fn drop(&mut self) {
        for (peer, session) in self.sessions.drain() {
            session.link.close_detached();
            if session.remote_bound {
                self.backend.release_remote(&peer);
            }
        }
        self.release_media();
        self.leave_room();
    }
}
