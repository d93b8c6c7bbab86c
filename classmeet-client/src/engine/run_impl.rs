use crate::backend::{PeerEvent, RtcBackend};
use crate::engine::{CallCommand, CallEvent, CallManager};
use crate::error::ClientError;
use classmeet_core::ServerMessage;
use futures::{Stream, StreamExt, future, stream};
use tracing::{info, warn};

enum Input {
    Server(ServerMessage),
    TransportClosed,
    Command(CallCommand),
    Peer(PeerEvent),
}

impl<B: RtcBackend> CallManager<B> {
    /// Drives the call from the signaling stream and user commands until it
    /// closes or fails.
    ///
    /// The end of `signals` means the transport is gone: everything is torn
    /// down and [`ClientError::Transport`] is returned.
    pub async fn run<S, C>(&mut self, signals: S, commands: C) -> Result<(), ClientError>
    where
        S: Stream<Item = ServerMessage> + Unpin,
        C: Stream<Item = CallCommand> + Unpin,
    {
        let Some(mut peer_events) = self.peer_events_rx.take() else {
            return Err(ClientError::Backend("call is already running".into()));
        };

        let signals = signals
            .map(Input::Server)
            .chain(stream::once(future::ready(Input::TransportClosed)));
        let inputs = stream::select(
            stream::select(signals, commands.map(Input::Command)),
            peer_events.by_ref().map(Input::Peer),
        );

        let result = self.drive(inputs).await;
        self.peer_events_rx = Some(peer_events);
        result
    }

    async fn drive<I>(&mut self, inputs: I) -> Result<(), ClientError>
    where
        I: Stream<Item = Input>,
    {
        futures::pin_mut!(inputs);

        while let Some(input) = inputs.next().await {
            match input {
                Input::Server(msg) => self.handle_server_message(msg).await,
                Input::Peer(event) => self.handle_peer_event(event).await,
                Input::Command(cmd) => self.handle_command(cmd).await?,
                Input::TransportClosed => {
                    warn!("signaling transport closed");
                    self.end_call().await;
                    return Err(ClientError::Transport("signaling connection lost".into()));
                }
            }

            if self.state.is_terminal() {
                info!(state = ?self.state, "call finished");
                break;
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, cmd: CallCommand) -> Result<(), ClientError> {
        let outcome = match cmd {
            CallCommand::Start(constraints) => return self.start(constraints).await,
            CallCommand::Join { room, token, meta } => self.join(&room, token, meta),
            CallCommand::SendChat(text) => self.send_chat(&text),
            CallCommand::SetAudioEnabled(enabled) => {
                self.set_audio_enabled(enabled);
                Ok(())
            }
            CallCommand::SetVideoEnabled(enabled) => {
                self.set_video_enabled(enabled);
                Ok(())
            }
            CallCommand::EndCall => {
                self.end_call().await;
                Ok(())
            }
        };

        if let Err(e) = outcome {
            warn!(error = %e, "command failed");
            self.emit(CallEvent::Error {
                message: e.to_string(),
            });
        }
        Ok(())
    }
}
