//! # Realtime Room Hub
//!
//! Pub/sub over named rooms for connected WebSocket clients. Each connection
//! owns an unbounded mpsc channel; `publish` pushes into the channel of every
//! member of the room in one pass, so messages published to a room arrive at
//! each member in publish order. Delivery is at-most-once: a connection that
//! has gone away is dropped from its rooms and nothing is retried or stored.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use domains::{Broadcaster, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Frame sent to clients: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub event: String,
    pub data: Value,
}

struct Connection {
    sender: mpsc::UnboundedSender<ServerMessage>,
    rooms: HashSet<String>,
}

#[derive(Default)]
pub struct RoomHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. The receiver yields every message published to
    /// the rooms it joins until [`RoomHub::disconnect`].
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.insert(
            id,
            Connection {
                sender,
                rooms: HashSet::new(),
            },
        );
        debug!(connection = %id, "realtime connection opened");
        (id, receiver)
    }

    /// Returns false when the connection is unknown.
    pub fn join_room(&self, connection: ConnectionId, room: &str) -> bool {
        match self.connections.get_mut(&connection) {
            Some(mut conn) => {
                conn.rooms.insert(room.to_string());
            }
            None => return false,
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection);
        debug!(%connection, room, "joined room");
        true
    }

    pub fn leave_room(&self, connection: ConnectionId, room: &str) {
        if let Some(mut conn) = self.connections.get_mut(&connection) {
            conn.rooms.remove(room);
        }
        self.remove_member(room, connection);
    }

    pub fn disconnect(&self, connection: ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(&connection) {
            for room in &conn.rooms {
                self.remove_member(room, connection);
            }
            debug!(%connection, "realtime connection closed");
        }
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_member(&self, room: &str, connection: ConnectionId) {
        self.rooms.remove_if_mut(room, |_, members| {
            members.remove(&connection);
            members.is_empty()
        });
    }

    /// Sends to every member of `room` and returns how many received it.
    pub fn dispatch(&self, room: &str, message: ServerMessage) -> usize {
        let Some(members) = self.rooms.get(room) else {
            debug!(room, event = %message.event, "no listeners");
            return 0;
        };
        let mut delivered = 0;
        let mut gone = Vec::new();
        for id in members.iter() {
            match self.connections.get(id) {
                Some(conn) if conn.sender.send(message.clone()).is_ok() => delivered += 1,
                _ => gone.push(*id),
            }
        }
        drop(members);
        for id in gone {
            self.disconnect(id);
        }
        debug!(room, event = %message.event, delivered, "dispatched");
        delivered
    }
}

#[async_trait]
impl Broadcaster for RoomHub {
    async fn publish(&self, room: &str, event: &str, payload: Value) -> Result<()> {
        self.dispatch(
            room,
            ServerMessage {
                event: event.to_string(),
                data: payload,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn members_receive_in_publish_order() {
        let hub = RoomHub::new();
        let (conn, mut rx) = hub.connect();
        assert!(hub.join_room(conn, "questions"));

        for n in 0..5 {
            hub.publish("questions", "newQuestion", json!({ "n": n }))
                .await
                .unwrap();
        }
        for n in 0..5 {
            let message = rx.recv().await.unwrap();
            assert_eq!(message.event, "newQuestion");
            assert_eq!(message.data["n"], n);
        }
    }

    #[tokio::test]
    async fn non_members_receive_nothing() {
        let hub = RoomHub::new();
        let (inside, mut inside_rx) = hub.connect();
        let (_outside, mut outside_rx) = hub.connect();
        hub.join_room(inside, "user-a");

        hub.publish("user-a", "notification", json!({})).await.unwrap();
        assert!(inside_rx.try_recv().is_ok());
        assert!(outside_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let hub = RoomHub::new();
        let (conn, rx) = hub.connect();
        hub.join_room(conn, "questions");
        drop(rx);

        assert_eq!(hub.dispatch("questions", ServerMessage { event: "x".into(), data: json!(null) }), 0);
        assert_eq!(hub.room_size("questions"), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn leaving_and_disconnecting_empty_rooms() {
        let hub = RoomHub::new();
        let (a, _rx_a) = hub.connect();
        let (b, _rx_b) = hub.connect();
        hub.join_room(a, "questions");
        hub.join_room(b, "questions");
        hub.leave_room(a, "questions");
        assert_eq!(hub.room_size("questions"), 1);
        hub.disconnect(b);
        assert_eq!(hub.room_size("questions"), 0);
        assert!(!hub.join_room(b, "questions"));
    }
}
