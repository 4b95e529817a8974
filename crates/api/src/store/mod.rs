//! Conversation and message persistence
//!
//! The store is the single writer-of-record. Every mutation reaches it through
//! the [`crate::dispatcher::MessageDispatcher`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use parley_shared::{Conversation, DeliveryStatus, Message, MessageId, ParseEnumError, SenderKind};
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or failing; callers may retry later
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Record not found")]
    NotFound,
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                StoreError::Unavailable(err.to_string())
            }
        }
    }
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// A message accepted by the dispatcher, not yet assigned an id
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_kind: SenderKind,
    pub sender_id: Option<Uuid>,
    pub content: String,
    pub idempotency_key: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Result of a delivery-status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Status moved forward
    Advanced(Message),
    /// Requested status was not later than the current one; message untouched
    Unchanged(Message),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Cheap connectivity check used by the readiness route
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// All conversations of a company, most recent activity first
    async fn list_conversations(&self, company_id: Uuid) -> Result<Vec<Conversation>, StoreError>;

    /// Overwrite the mutable fields of an existing conversation
    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Atomically assign the next id, persist the message with status `sent`,
    /// and fold it into the conversation summary.
    async fn append_message(&self, message: NewMessage)
        -> Result<(Message, Conversation), StoreError>;

    /// Message previously sent with `key` in this conversation, created no earlier than `not_before`
    async fn find_by_idempotency_key(
        &self,
        conversation_id: Uuid,
        key: &str,
        not_before: OffsetDateTime,
    ) -> Result<Option<Message>, StoreError>;

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Timeline of a conversation in id order
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// Move a message's delivery status forward; never regresses
    async fn advance_message_status(
        &self,
        id: MessageId,
        status: DeliveryStatus,
    ) -> Result<StatusUpdate, StoreError>;
}

/// Order conversations by last activity, newest first; never-active last
pub(crate) fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
