//! Real-time event types and serialization
//!
//! Defines all client-to-server and server-to-client events. Frames are
//! `{"event": "<name>", "data": {...}}` with camelCase payload fields.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Conversation, DeliveryStatus, Message, MessageId};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Join a conversation's broadcast room
    #[serde(rename = "conversation:join", rename_all = "camelCase")]
    JoinConversation { conversation_id: Uuid },

    /// Leave a conversation's broadcast room
    #[serde(rename = "conversation:leave", rename_all = "camelCase")]
    LeaveConversation { conversation_id: Uuid },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { conversation_id: Uuid },

    /// Presence heartbeat, roughly every 30 seconds
    #[serde(rename = "presence:ping")]
    PresencePing {},
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Connection acknowledged
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { session_id: Uuid },

    /// New message persisted, with the updated conversation summary
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        conversation_id: Uuid,
        message: Message,
        conversation: Conversation,
    },

    /// Full conversation projection after an assignment/status/tag/read change
    #[serde(rename = "conversation:updated")]
    ConversationUpdated { conversation: Conversation },

    #[serde(rename = "contact:typing", rename_all = "camelCase")]
    ContactTyping {
        conversation_id: Uuid,
        is_typing: bool,
    },

    #[serde(rename = "agent:typing", rename_all = "camelCase")]
    AgentTyping {
        conversation_id: Uuid,
        agent_id: Uuid,
        agent_name: String,
        is_typing: bool,
    },

    /// Delivery status moved forward
    #[serde(rename = "message:status", rename_all = "camelCase")]
    MessageStatus {
        message_id: MessageId,
        status: DeliveryStatus,
    },

    /// Error scoped to the receiving session
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Wire name of the event, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::MessageNew { .. } => "message:new",
            Self::ConversationUpdated { .. } => "conversation:updated",
            Self::ContactTyping { .. } => "contact:typing",
            Self::AgentTyping { .. } => "agent:typing",
            Self::MessageStatus { .. } => "message:status",
            Self::Error { .. } => "error",
        }
    }
}
