use crate::error::{BrokerClosed, JoinError};
use crate::room::broker_command::{BrokerCommand, BrokerStats};
use crate::room::guard::JoinGuard;
use crate::room::registry::{Departure, JoinOutcome, RoomRegistry};
use crate::signaling::SignalingOutput;
use classmeet_core::{ChatMessage, ConnectionId, Negotiation, RoomId, ServerMessage};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Relays negotiation and chat events between members of the same room.
///
/// The broker owns the [`RoomRegistry`] and handles one command at a time,
/// so registry reads and fan-out never interleave with another
/// connection's mutation.
pub struct Broker {
    registry: RoomRegistry,
    command_rx: mpsc::Receiver<BrokerCommand>,
    output: Arc<dyn SignalingOutput>,
    guard: Arc<dyn JoinGuard>,
    max_room_members: usize,
}

/// Cloneable sender side of a running [`Broker`].
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    pub async fn send(&self, cmd: BrokerCommand) -> Result<(), BrokerClosed> {
        self.tx.send(cmd).await.map_err(|_| BrokerClosed)
    }

    pub async fn stats(&self) -> Result<BrokerStats, BrokerClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Stats { reply }).await?;
        rx.await.map_err(|_| BrokerClosed)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(BrokerCommand::Shutdown).await;
    }
}

impl Broker {
    pub fn new(
        command_rx: mpsc::Receiver<BrokerCommand>,
        output: Arc<dyn SignalingOutput>,
        guard: Arc<dyn JoinGuard>,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(),
            command_rx,
            output,
            guard,
            max_room_members: 0,
        }
    }

    /// `0` means unlimited.
    pub fn with_max_room_members(mut self, max: usize) -> Self {
        self.max_room_members = max;
        self
    }

    /// Creates the command channel and runs the broker on the tokio runtime.
    pub fn spawn(
        output: Arc<dyn SignalingOutput>,
        guard: Arc<dyn JoinGuard>,
        command_buffer: usize,
        max_room_members: usize,
    ) -> (BrokerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(command_buffer.max(1));
        let broker = Broker::new(rx, output, guard).with_max_room_members(max_room_members);
        let task = tokio::spawn(broker.run());
        (BrokerHandle { tx }, task)
    }

    pub async fn run(mut self) {
        info!("Signaling broker started");

        while let Some(cmd) = self.command_rx.recv().await {
            if matches!(cmd, BrokerCommand::Shutdown) {
                info!("Shutdown requested");
                break;
            }
            self.handle_command(cmd).await;
        }

        info!(
            rooms = self.registry.room_count(),
            connections = self.registry.connection_count(),
            "Signaling broker stopped, dropping registry"
        );
        self.registry.clear();
    }

    async fn handle_command(&mut self, cmd: BrokerCommand) {
        match cmd {
            BrokerCommand::Connect { connection_id } => {
                debug!(%connection_id, "connection registered");
                self.registry.register(connection_id);
            }

            BrokerCommand::Join {
                connection_id,
                room,
                token,
                meta,
            } => {
                if let Err(e) = self.join(connection_id, &room, token.as_deref(), meta).await {
                    warn!(%connection_id, room = %room, error = %e, "join rejected");
                    self.output
                        .deliver(
                            &connection_id,
                            ServerMessage::JoinRejected {
                                reason: e.to_string(),
                            },
                        )
                        .await;
                }
            }

            BrokerCommand::Leave { connection_id } => {
                if let Some(departure) = self.registry.leave(&connection_id) {
                    info!(%connection_id, room = %departure.room, "left room");
                    self.notify_departure(&connection_id, departure).await;
                }
            }

            BrokerCommand::Relay {
                connection_id,
                to,
                signal,
            } => self.relay(connection_id, to, signal).await,

            BrokerCommand::Chat {
                connection_id,
                text,
                sent_at,
            } => self.chat(connection_id, text, sent_at).await,

            BrokerCommand::Disconnect { connection_id } => {
                info!(%connection_id, "connection gone");
                if let Some(departure) = self.registry.unregister(&connection_id) {
                    self.notify_departure(&connection_id, departure).await;
                }
            }

            BrokerCommand::Stats { reply } => {
                let _ = reply.send(BrokerStats {
                    rooms: self.registry.room_count(),
                    connections: self.registry.connection_count(),
                });
            }

            BrokerCommand::Shutdown => {}
        }
    }

    async fn join(
        &mut self,
        connection_id: ConnectionId,
        raw_room: &str,
        token: Option<&str>,
        meta: Option<Value>,
    ) -> Result<(), JoinError> {
        let room = RoomId::parse(raw_room)?;
        self.guard.authorize(&connection_id, &room, token)?;

        let already_member = self.registry.room_of(&connection_id) == Some(&room);
        if !already_member
            && self.max_room_members > 0
            && self.registry.room_len(&room) >= self.max_room_members
        {
            return Err(JoinError::RoomFull {
                room,
                max: self.max_room_members,
            });
        }

        let outcome = self.registry.join(connection_id, room.clone(), meta);

        if let JoinOutcome::Joined { left: Some(departure) } = &outcome {
            info!(%connection_id, from = %departure.room, to = %room, "switching rooms");
            self.notify_departure(&connection_id, departure.clone()).await;
        }

        let others = self.registry.members_of(&room, &connection_id);
        let peers = others.iter().map(|id| self.registry.peer_info(id)).collect();

        self.output
            .deliver(
                &connection_id,
                ServerMessage::Joined {
                    room: room.clone(),
                    peers,
                },
            )
            .await;

        if outcome == JoinOutcome::AlreadyMember {
            debug!(%connection_id, room = %room, "already a member");
            return Ok(());
        }

        info!(%connection_id, room = %room, members = others.len() + 1, "joined room");

        let announcement = ServerMessage::PeerJoined {
            peer: self.registry.peer_info(&connection_id),
        };
        self.fan_out(&others, announcement).await;

        Ok(())
    }

    async fn relay(
        &mut self,
        from: ConnectionId,
        to: Option<ConnectionId>,
        signal: Negotiation,
    ) {
        let Some(room) = self.registry.room_of(&from) else {
            debug!(connection_id = %from, kind = ?signal.kind, "relay from unjoined connection dropped");
            return;
        };

        let mut targets = self.registry.members_of(room, &from);
        if let Some(target) = to {
            targets.retain(|id| *id == target);
            if targets.is_empty() {
                debug!(connection_id = %from, %target, "relay target not in room, dropped");
                return;
            }
        }

        debug!(
            connection_id = %from,
            kind = ?signal.kind,
            targets = targets.len(),
            "relaying signal"
        );
        self.fan_out(&targets, ServerMessage::Signal { from, signal })
            .await;
    }

    async fn chat(&mut self, from: ConnectionId, text: String, sent_at: Option<u64>) {
        if text.trim().is_empty() {
            return;
        }

        let Some(room) = self.registry.room_of(&from) else {
            debug!(connection_id = %from, "chat from unjoined connection dropped");
            return;
        };

        let targets = self.registry.members_of(room, &from);
        let msg = ServerMessage::Chat(ChatMessage {
            from,
            text,
            sent_at: sent_at.unwrap_or_else(now_millis),
        });
        self.fan_out(&targets, msg).await;
    }

    async fn notify_departure(&self, connection_id: &ConnectionId, departure: Departure) {
        let msg = ServerMessage::PeerLeft {
            connection_id: *connection_id,
        };
        self.fan_out(&departure.remaining, msg).await;
    }

    async fn fan_out(&self, targets: &[ConnectionId], msg: ServerMessage) {
        for target in targets {
            self.output.deliver(target, msg.clone()).await;
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
