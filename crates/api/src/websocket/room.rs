//! Conversation room management for pub/sub
//!
//! A room holds every connection currently viewing one conversation.

use std::collections::HashMap;
use std::sync::Arc;

use parley_shared::ServerEvent;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;

/// Manages conversation "rooms" for broadcasting events
pub struct RoomManager {
    /// Map of conversation_id -> connections in join order
    rooms: Arc<RwLock<HashMap<Uuid, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub async fn join(&self, conversation_id: Uuid, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(conversation_id).or_default();
        if members.iter().any(|c| c.session_id() == conn.session_id()) {
            return;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %conn.session_id(),
            room_size = members.len(),
            "Connection joined conversation room"
        );
    }

    /// Remove a connection from a room
    pub async fn leave(&self, conversation_id: &Uuid, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(conversation_id) {
            conns.retain(|c| c.session_id() != *session_id);

            if conns.is_empty() {
                rooms.remove(conversation_id);
                tracing::debug!(conversation_id = %conversation_id, "Removed empty conversation room");
            } else {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    session_id = %session_id,
                    room_size = conns.len(),
                    "Connection left conversation room"
                );
            }
        }
    }

    /// Queue an event on every connection in a room. Returns how many accepted it.
    ///
    /// Never blocks on a slow client: each connection has its own unbounded
    /// queue drained by its writer task.
    pub async fn broadcast(&self, conversation_id: &Uuid, event: ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(conversation_id) else {
            tracing::trace!(
                conversation_id = %conversation_id,
                event_type = event.name(),
                "No viewers for conversation"
            );
            return 0;
        };

        let mut delivered = 0;
        let mut failed = 0;
        for conn in conns {
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    failed += 1;
                    tracing::warn!(
                        session_id = %conn.session_id(),
                        "Failed to queue event for connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            event_type = event.name(),
            recipients = delivered,
            failed,
            "Broadcast event to conversation room"
        );
        delivered
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0usize;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.session_id() != *session_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                session_id = %session_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    /// Number of connections in a room
    pub async fn room_size(&self, conversation_id: &Uuid) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(conversation_id).map(Vec::len).unwrap_or(0)
    }

    /// Number of rooms with at least one member
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
