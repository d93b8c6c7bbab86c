use classmeet_core::{ConnectionId, PeerInfo, RoomId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct Connection {
    room: Option<RoomId>,
    meta: Option<Value>,
}

/// A connection left `room`; `remaining` are the members still in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room: RoomId,
    pub remaining: Vec<ConnectionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Membership changed. `left` is set when the connection was moved out of
    /// another room first.
    Joined { left: Option<Departure> },
    AlreadyMember,
}

/// Room membership for every live connection of one broker.
///
/// A connection belongs to at most one room. Rooms exist only while they
/// have members.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection_id: ConnectionId) {
        self.connections.entry(connection_id).or_default();
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room: RoomId,
        meta: Option<Value>,
    ) -> JoinOutcome {
        let current = self
            .connections
            .get(&connection_id)
            .and_then(|c| c.room.clone());

        if current.as_ref() == Some(&room) {
            return JoinOutcome::AlreadyMember;
        }

        let left = self.leave(&connection_id);

        let connection = self.connections.entry(connection_id).or_default();
        connection.room = Some(room.clone());
        connection.meta = meta;

        self.rooms.entry(room).or_default().insert(connection_id);

        JoinOutcome::Joined { left }
    }

    pub fn leave(&mut self, connection_id: &ConnectionId) -> Option<Departure> {
        let room = self.connections.get_mut(connection_id)?.room.take()?;

        let members = self.rooms.get_mut(&room)?;
        members.remove(connection_id);

        let remaining: Vec<ConnectionId> = members.iter().copied().collect();
        if remaining.is_empty() {
            self.rooms.remove(&room);
        }

        Some(Departure { room, remaining })
    }

    /// Drops the connection entirely, leaving its room first.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Departure> {
        let departure = self.leave(connection_id);
        self.connections.remove(connection_id);
        departure
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&RoomId> {
        self.connections.get(connection_id)?.room.as_ref()
    }

    /// Members of `room` other than `excluding`.
    pub fn members_of(&self, room: &RoomId, excluding: &ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter(|id| *id != excluding)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn peer_info(&self, connection_id: &ConnectionId) -> PeerInfo {
        PeerInfo {
            connection_id: *connection_id,
            meta: self
                .connections
                .get(connection_id)
                .and_then(|c| c.meta.clone()),
        }
    }

    pub fn room_len(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
        self.connections.clear();
    }
}
