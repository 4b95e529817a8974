//! In-memory store for tests and database-less development

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parley_shared::{Conversation, DeliveryStatus, Message, MessageId};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{sort_by_recent_activity, ConversationStore, NewMessage, StatusUpdate, StoreError};

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    messages: BTreeMap<MessageId, Message>,
    last_message_id: MessageId,
}

/// Process-local store. All writes happen under one lock, so every call is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every call fails with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        self.check_available()?;
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn list_conversations(&self, company_id: Uuid) -> Result<Vec<Conversation>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut list: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect();
        sort_by_recent_activity(&mut list);
        Ok(list)
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let slot = inner
            .conversations
            .get_mut(&conversation.id)
            .ok_or(StoreError::NotFound)?;
        *slot = conversation.clone();
        Ok(())
    }

    async fn append_message(
        &self,
        message: NewMessage,
    ) -> Result<(Message, Conversation), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound);
        }

        inner.last_message_id += 1;
        let message = Message {
            id: inner.last_message_id,
            conversation_id: message.conversation_id,
            sender_kind: message.sender_kind,
            sender_id: message.sender_id,
            content: message.content,
            status: DeliveryStatus::Sent,
            created_at: message.created_at,
            idempotency_key: message.idempotency_key,
        };
        inner.messages.insert(message.id, message.clone());

        let conversation = inner
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or(StoreError::NotFound)?;
        conversation.record_message(&message);

        Ok((message, conversation.clone()))
    }

    async fn find_by_idempotency_key(
        &self,
        conversation_id: Uuid,
        key: &str,
        not_before: OffsetDateTime,
    ) -> Result<Option<Message>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .values()
            .rev()
            .find(|m| {
                m.conversation_id == conversation_id
                    && m.idempotency_key.as_deref() == Some(key)
                    && m.created_at >= not_before
            })
            .cloned())
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        self.check_available()?;
        Ok(self.inner.read().await.messages.get(&id).cloned())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn advance_message_status(
        &self,
        id: MessageId,
        status: DeliveryStatus,
    ) -> Result<StatusUpdate, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let message = inner.messages.get_mut(&id).ok_or(StoreError::NotFound)?;

        match message.status.advance(status) {
            Ok(next) => {
                message.status = next;
                Ok(StatusUpdate::Advanced(message.clone()))
            }
            Err(_) => Ok(StatusUpdate::Unchanged(message.clone())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parley_shared::SenderKind;

    fn new_message(conversation_id: Uuid, content: &str, key: Option<&str>) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_kind: SenderKind::Contact,
            sender_id: None,
            content: content.to_string(),
            idempotency_key: key.map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids_and_updates_summary() {
        let store = InMemoryStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();

        let (first, _) = store.append_message(new_message(conv.id, "one", None)).await.unwrap();
        let (second, summary) = store.append_message(new_message(conv.id, "two", None)).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(second.status, DeliveryStatus::Sent);
        assert_eq!(summary.unread_count, 2);
        assert_eq!(summary.last_message_preview.as_deref(), Some("two"));

        let timeline = store.list_messages(conv.id).await.unwrap();
        assert_eq!(timeline.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation() {
        let store = InMemoryStore::new();
        let result = store.append_message(new_message(Uuid::new_v4(), "x", None)).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_idempotency_lookup_respects_window() {
        let store = InMemoryStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();
        let (sent, _) = store
            .append_message(new_message(conv.id, "hello", Some("abc123")))
            .await
            .unwrap();

        let past = OffsetDateTime::now_utc() - time::Duration::minutes(5);
        let found = store.find_by_idempotency_key(conv.id, "abc123", past).await.unwrap();
        assert_eq!(found.map(|m| m.id), Some(sent.id));

        let future = OffsetDateTime::now_utc() + time::Duration::minutes(5);
        let expired = store.find_by_idempotency_key(conv.id, "abc123", future).await.unwrap();
        assert!(expired.is_none());
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        let store = InMemoryStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();
        let (msg, _) = store.append_message(new_message(conv.id, "x", None)).await.unwrap();

        let update = store
            .advance_message_status(msg.id, DeliveryStatus::Delivered)
            .await
            .unwrap();
        assert!(matches!(update, StatusUpdate::Advanced(_)));

        let update = store
            .advance_message_status(msg.id, DeliveryStatus::Sent)
            .await
            .unwrap();
        assert!(matches!(update, StatusUpdate::Unchanged(ref m) if m.status == DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn test_list_conversations_sorted_and_scoped() {
        let store = InMemoryStore::new();
        let company = Uuid::new_v4();
        let quiet = Conversation::new(company, Uuid::new_v4());
        let busy = Conversation::new(company, Uuid::new_v4());
        let foreign = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        for c in [&quiet, &busy, &foreign] {
            store.insert_conversation(c).await.unwrap();
        }
        store.append_message(new_message(busy.id, "ping", None)).await.unwrap();

        let list = store.list_conversations(company).await.unwrap();
        assert_eq!(list.iter().map(|c| c.id).collect::<Vec<_>>(), vec![busy.id, quiet.id]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_fast() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
    }
}
