use crate::app::AppState;
use crate::room::BrokerCommand;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use classmeet_core::{ClientMessage, ConnectionId, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    info!(%connection_id, "New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _ = tx.send(ServerMessage::Welcome { connection_id });
    let _ = tx.send(ServerMessage::IceConfig {
        ice_servers: state.ice_servers.as_ref().clone(),
    });
    state.service.add_connection(connection_id, tx);

    if state
        .broker
        .send(BrokerCommand::Connect { connection_id })
        .await
        .is_err()
    {
        error!(%connection_id, "Broker is down, refusing connection");
        state.service.remove_connection(&connection_id);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let broker = state.broker.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            let cmd = BrokerCommand::from_client(connection_id, client_msg);
                            if let Err(e) = broker.send(cmd).await {
                                error!(%connection_id, "{}", e);
                                break;
                            }
                        }
                        Err(e) => warn!(%connection_id, "Invalid ClientMessage: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.service.remove_connection(&connection_id);
    let _ = state
        .broker
        .send(BrokerCommand::Disconnect { connection_id })
        .await;
    info!(%connection_id, "WebSocket disconnected");
}
