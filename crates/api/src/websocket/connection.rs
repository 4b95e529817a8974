//! WebSocket connection management
//!
//! Represents one authenticated socket with its room memberships and a
//! cancellation handle used to force it closed.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use parley_shared::ServerEvent;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::SessionContext;

/// Why the server ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client closed the socket or the stream failed
    ClientClosed,
    /// Admitting token reached its expiry
    TokenExpired,
    /// Token or user was revoked while the session was live
    Revoked,
}

impl DisconnectReason {
    /// WebSocket close code sent to the client (4000-4999 is application-defined)
    pub fn close_code(self) -> u16 {
        match self {
            DisconnectReason::ClientClosed => 1000,
            DisconnectReason::TokenExpired => 4001,
            DisconnectReason::Revoked => 4003,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::ClientClosed => "closed",
            DisconnectReason::TokenExpired => "token expired",
            DisconnectReason::Revoked => "session revoked",
        }
    }
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Identity the socket was admitted with; immutable for its lifetime
    pub ctx: SessionContext,

    /// Channel to the socket's writer task
    sender: mpsc::UnboundedSender<ServerEvent>,

    /// Conversations this connection has joined
    rooms: Arc<RwLock<HashSet<Uuid>>>,

    cancel: CancellationToken,
    reason: OnceLock<DisconnectReason>,
}

impl Connection {
    pub fn new(ctx: SessionContext, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            ctx,
            sender,
            rooms: Arc::new(RwLock::new(HashSet::new())),
            cancel: CancellationToken::new(),
            reason: OnceLock::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.ctx.session_id
    }

    pub fn user_id(&self) -> Uuid {
        self.ctx.user_id
    }

    pub fn company_id(&self) -> Uuid {
        self.ctx.company_id
    }

    /// Queue an event for this connection
    ///
    /// Returns Err if the writer task is gone
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Record membership; returns false if already a member
    pub async fn join(&self, conversation_id: Uuid) -> bool {
        self.rooms.write().await.insert(conversation_id)
    }

    /// Drop membership; returns false if not a member
    pub async fn leave(&self, conversation_id: Uuid) -> bool {
        self.rooms.write().await.remove(&conversation_id)
    }

    pub async fn is_member(&self, conversation_id: Uuid) -> bool {
        self.rooms.read().await.contains(&conversation_id)
    }

    /// End the session. The first reason recorded wins.
    pub fn terminate(&self, reason: DisconnectReason) {
        let _ = self.reason.set(reason);
        self.cancel.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.reason.get().copied()
    }

    /// Token that fires when the session is terminated
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
