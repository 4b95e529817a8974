//! Session registry
//!
//! Tracks every live connection and its conversation rooms. Room joins are
//! checked against the conversation's tenant before membership is granted.

use std::collections::HashMap;
use std::sync::Arc;

use parley_shared::ServerEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::connection::{Connection, DisconnectReason};
use super::room::RoomManager;
use crate::auth::SessionContext;
use crate::presence::PresenceTracker;
use crate::store::ConversationStore;

/// Global session state shared across all connections
#[derive(Clone)]
pub struct SessionRegistry {
    /// All active connections indexed by session_id
    connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,
    rooms: Arc<RoomManager>,
    store: Arc<dyn ConversationStore>,
    presence: Arc<PresenceTracker>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ConversationStore>, presence: Arc<PresenceTracker>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
            store,
            presence,
        }
    }

    /// Admit an authenticated session. Counts as a presence heartbeat.
    pub async fn register(
        &self,
        ctx: SessionContext,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(ctx, sender));
        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(conn.session_id(), Arc::clone(&conn));
            connections.len()
        };
        self.presence.heartbeat(conn.user_id()).await;

        tracing::info!(
            session_id = %conn.session_id(),
            user_id = %conn.user_id(),
            company_id = %conn.company_id(),
            total_connections = total,
            "Session registered"
        );

        conn
    }

    /// Subscribe a session to a conversation's broadcasts.
    ///
    /// Returns whether the session is a member afterwards. Unknown or
    /// foreign-tenant conversations are refused without telling the client.
    pub async fn join_room(&self, conn: &Arc<Connection>, conversation_id: Uuid) -> bool {
        if conn.is_terminated() {
            return false;
        }

        let conversation = match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                tracing::warn!(
                    session_id = %conn.session_id(),
                    conversation_id = %conversation_id,
                    "Join refused: conversation not found"
                );
                return false;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    session_id = %conn.session_id(),
                    conversation_id = %conversation_id,
                    "Join failed: could not load conversation"
                );
                return false;
            }
        };

        if !conn.ctx.can_access_company(conversation.company_id) {
            tracing::warn!(
                session_id = %conn.session_id(),
                company_id = %conn.company_id(),
                conversation_id = %conversation_id,
                "Join refused: conversation belongs to another company"
            );
            return false;
        }

        conn.join(conversation_id).await;
        self.rooms.join(conversation_id, Arc::clone(conn)).await;
        true
    }

    /// Unsubscribe a session from a conversation
    pub async fn leave_room(&self, conn: &Connection, conversation_id: Uuid) {
        if conn.leave(conversation_id).await {
            self.rooms.leave(&conversation_id, &conn.session_id()).await;
        }
    }

    /// Fan an event out to every session in the conversation's room
    pub async fn broadcast(&self, conversation_id: Uuid, event: ServerEvent) -> usize {
        self.rooms.broadcast(&conversation_id, event).await
    }

    /// Remove a session from the registry and all rooms.
    ///
    /// Returns how many sessions the same user still holds. When that reaches
    /// zero the user's presence is recomputed.
    pub async fn disconnect(&self, session_id: Uuid) -> Option<usize> {
        let (conn, remaining, total) = {
            let mut connections = self.connections.write().await;
            let conn = connections.remove(&session_id)?;
            let remaining = connections
                .values()
                .filter(|c| c.user_id() == conn.user_id())
                .count();
            (conn, remaining, connections.len())
        };

        conn.terminate(DisconnectReason::ClientClosed);
        self.rooms.remove_connection(&session_id).await;

        if remaining == 0 {
            self.presence.recompute(conn.user_id()).await;
        }

        tracing::info!(
            session_id = %session_id,
            user_id = %conn.user_id(),
            reason = conn.disconnect_reason().map(DisconnectReason::as_str),
            user_sessions_remaining = remaining,
            total_connections = total,
            "Session removed"
        );

        Some(remaining)
    }

    /// Force-close every live session a user holds in a company. Returns how many were closed.
    pub async fn revoke_user(&self, company_id: Uuid, user_id: Uuid) -> usize {
        let targets: Vec<Arc<Connection>> = self
            .user_connections(user_id)
            .await
            .into_iter()
            .filter(|c| c.company_id() == company_id)
            .collect();
        for conn in &targets {
            conn.terminate(DisconnectReason::Revoked);
        }
        if !targets.is_empty() {
            tracing::info!(user_id = %user_id, sessions = targets.len(), "Revoked user sessions");
        }
        targets.len()
    }

    /// Force-close every live session in a company admitted with the given token
    pub async fn revoke_token(&self, company_id: Uuid, token_id: &str) -> usize {
        let targets: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter(|c| c.company_id() == company_id && c.ctx.token_id == token_id)
                .cloned()
                .collect()
        };
        for conn in &targets {
            conn.terminate(DisconnectReason::Revoked);
        }
        if !targets.is_empty() {
            tracing::info!(jti = %token_id, sessions = targets.len(), "Revoked token sessions");
        }
        targets.len()
    }

    /// All live connections of a user
    pub async fn user_connections(&self, user_id: Uuid) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.user_id() == user_id)
            .cloned()
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn room_size(&self, conversation_id: Uuid) -> usize {
        self.rooms.room_size(&conversation_id).await
    }

    pub async fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_connections: self.connection_count().await,
            active_rooms: self.rooms.room_count().await,
        }
    }
}

/// Statistics about live sessions
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub active_connections: usize,
    pub active_rooms: usize,
}
