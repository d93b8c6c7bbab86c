use crate::error::ClientError;
use classmeet_core::{ClientMessage, ServerMessage};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// JSON signaling over a WebSocket, bridged onto `futures` channels.
///
/// Frames go out in the order they were queued. The inbound stream ends
/// when the server closes the socket or the connection drops.
pub struct SignalingClient {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

impl SignalingClient {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        info!(%url, "signaling connected");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded::<ServerMessage>();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.next().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode client frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::text(json)).await {
                    warn!(error = %e, "signaling write failed");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("signaling writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if in_tx.unbounded_send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "unparseable server frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "signaling read failed");
                        break;
                    }
                }
            }
            debug!("signaling reader finished");
        });

        Ok(Self {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    /// Sender for [`CallManager::new`](crate::CallManager::new) and the
    /// stream for [`CallManager::run`](crate::CallManager::run).
    pub fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<ClientMessage>,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        (self.outbound, self.inbound)
    }
}
