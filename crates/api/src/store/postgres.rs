//! Postgres-backed store

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use parley_shared::{Conversation, DeliveryStatus, Message, MessageId};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ConversationStore, NewMessage, StatusUpdate, StoreError};

/// Create a database connection pool
/// Note: Disables statement cache for PgBouncer compatibility
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
        .connect_with(options)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

// =============================================================================
// Database Row Types
// =============================================================================

const CONVERSATION_COLUMNS: &str = "id, company_id, contact_id, assigned_agent_id, status, \
     last_message_at, last_message_preview, unread_count, tags, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_kind, sender_id, content, status, created_at, idempotency_key";

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    company_id: Uuid,
    contact_id: Uuid,
    assigned_agent_id: Option<Uuid>,
    status: String,
    last_message_at: Option<OffsetDateTime>,
    last_message_preview: Option<String>,
    unread_count: i32,
    tags: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: row.id,
            company_id: row.company_id,
            contact_id: row.contact_id,
            assigned_agent_id: row.assigned_agent_id,
            status: row.status.parse()?,
            last_message_at: row.last_message_at,
            last_message_preview: row.last_message_preview,
            unread_count: u32::try_from(row.unread_count).unwrap_or(0),
            tags: row.tags,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: Uuid,
    sender_kind: String,
    sender_id: Option<Uuid>,
    content: String,
    status: String,
    created_at: OffsetDateTime,
    idempotency_key: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_kind: row.sender_kind.parse()?,
            sender_id: row.sender_id,
            content: row.content,
            status: row.status.parse()?,
            created_at: row.created_at,
            idempotency_key: row.idempotency_key,
        })
    }
}

fn unread_to_db(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

// =============================================================================
// Store
// =============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, company_id, contact_id, assigned_agent_id, status,
                last_message_at, last_message_preview, unread_count, tags,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.company_id)
        .bind(conversation.contact_id)
        .bind(conversation.assigned_agent_id)
        .bind(conversation.status.as_str())
        .bind(conversation.last_message_at)
        .bind(&conversation.last_message_preview)
        .bind(unread_to_db(conversation.unread_count))
        .bind(&conversation.tags)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Conversation::try_from).transpose()
    }

    async fn list_conversations(&self, company_id: Uuid) -> Result<Vec<Conversation>, StoreError> {
        let rows: Vec<ConversationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE company_id = $1
            ORDER BY last_message_at DESC NULLS LAST, id ASC
            "#
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Conversation::try_from).collect()
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET assigned_agent_id = $2,
                status = $3,
                last_message_at = $4,
                last_message_preview = $5,
                unread_count = $6,
                tags = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.assigned_agent_id)
        .bind(conversation.status.as_str())
        .bind(conversation.last_message_at)
        .bind(&conversation.last_message_preview)
        .bind(unread_to_db(conversation.unread_count))
        .bind(&conversation.tags)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn append_message(
        &self,
        message: NewMessage,
    ) -> Result<(Message, Conversation), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises concurrent appends to the same conversation
        let row: ConversationRow = sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 FOR UPDATE"
        ))
        .bind(message.conversation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        let mut conversation = Conversation::try_from(row)?;

        let row: MessageRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO messages (
                conversation_id, sender_kind, sender_id, content, status,
                created_at, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.conversation_id)
        .bind(message.sender_kind.as_str())
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(DeliveryStatus::Sent.as_str())
        .bind(message.created_at)
        .bind(&message.idempotency_key)
        .fetch_one(&mut *tx)
        .await?;
        let message = Message::try_from(row)?;

        conversation.record_message(&message);
        sqlx::query(
            r#"
            UPDATE conversations
            SET status = $2,
                last_message_at = $3,
                last_message_preview = $4,
                unread_count = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.status.as_str())
        .bind(conversation.last_message_at)
        .bind(&conversation.last_message_preview)
        .bind(unread_to_db(conversation.unread_count))
        .bind(conversation.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((message, conversation))
    }

    async fn find_by_idempotency_key(
        &self,
        conversation_id: Uuid,
        key: &str,
        not_before: OffsetDateTime,
    ) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND idempotency_key = $2 AND created_at >= $3
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(conversation_id)
        .bind(key)
        .bind(not_before)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Message::try_from).transpose()
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY id ASC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn advance_message_status(
        &self,
        id: MessageId,
        status: DeliveryStatus,
    ) -> Result<StatusUpdate, StoreError> {
        // Conditional update: only rows whose current rank is lower move
        let advanced: Option<MessageRow> = sqlx::query_as(&format!(
            r#"
            UPDATE messages
            SET status = $2
            WHERE id = $1
              AND (CASE status
                     WHEN 'sending' THEN 0
                     WHEN 'sent' THEN 1
                     WHEN 'delivered' THEN 2
                     WHEN 'read' THEN 3
                   END) < $3
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(status.rank())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = advanced {
            return Ok(StatusUpdate::Advanced(Message::try_from(row)?));
        }

        let current = self.get_message(id).await?.ok_or(StoreError::NotFound)?;
        Ok(StatusUpdate::Unchanged(current))
    }
}
