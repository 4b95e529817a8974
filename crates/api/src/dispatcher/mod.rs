//! Message dispatcher
//!
//! Source of truth for message ordering. Every message and conversation
//! change is validated, persisted, and then fanned out to the conversation's
//! room. Writes to one conversation are serialized, so subscribers see
//! `message:new` in id order.

mod locks;
pub mod outbox;

use std::sync::Arc;
use std::time::Duration;

use parley_shared::{
    Conversation, ConversationPatch, DeliveryStatus, Message, MessageId, SenderKind, ServerEvent,
    MESSAGE_MAX_CHARS,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::store::{ConversationStore, NewMessage, StatusUpdate, StoreError};
use crate::websocket::SessionRegistry;
use locks::ConversationLocks;
pub use outbox::{ChannelError, ChannelOutbox, ContactChannel, LoggingChannel, OutboundMessage};

/// Longest accepted idempotency key
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Missing or owned by another company; the two are indistinguishable
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error("Message not found")]
    MessageNotFound,
    #[error("Conversation is resolved")]
    ConversationClosed,
    #[error("{0}")]
    Validation(String),
    /// Persisting a new message failed; nothing was broadcast and the client may retry
    #[error("Message could not be stored: {0}")]
    TransientSendFailure(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => DispatchError::Unavailable(e),
            StoreError::NotFound => DispatchError::ConversationNotFound,
            StoreError::Corrupt(e) => DispatchError::Internal(e),
        }
    }
}

/// Author of a message, with the scope it is allowed to write in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Agent { company_id: Uuid, user_id: Uuid },
    Contact { company_id: Uuid, contact_id: Uuid },
    System { company_id: Uuid },
}

impl Sender {
    pub fn agent(ctx: &SessionContext) -> Self {
        Sender::Agent {
            company_id: ctx.company_id,
            user_id: ctx.user_id,
        }
    }

    pub fn kind(&self) -> SenderKind {
        match self {
            Sender::Agent { .. } => SenderKind::Agent,
            Sender::Contact { .. } => SenderKind::Contact,
            Sender::System { .. } => SenderKind::System,
        }
    }

    fn sender_id(&self) -> Option<Uuid> {
        match self {
            Sender::Agent { user_id, .. } => Some(*user_id),
            Sender::Contact { contact_id, .. } => Some(*contact_id),
            Sender::System { .. } => None,
        }
    }

    /// Whether this sender may see the conversation at all
    fn can_see(&self, conversation: &Conversation) -> bool {
        match self {
            Sender::Agent { company_id, .. } | Sender::System { company_id } => {
                conversation.company_id == *company_id
            }
            Sender::Contact {
                company_id,
                contact_id,
            } => conversation.company_id == *company_id && conversation.contact_id == *contact_id,
        }
    }
}

/// A message submission
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub content: String,
    pub idempotency_key: Option<String>,
}

/// Outcome of [`MessageDispatcher::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message: Message,
    /// The idempotency key matched an earlier send; nothing new was stored or broadcast
    pub replayed: bool,
}

pub struct MessageDispatcher {
    store: Arc<dyn ConversationStore>,
    registry: SessionRegistry,
    outbox: ChannelOutbox,
    locks: ConversationLocks,
    idempotency_window: Duration,
}

impl MessageDispatcher {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: SessionRegistry,
        outbox: ChannelOutbox,
        idempotency_window: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            outbox,
            locks: ConversationLocks::default(),
            idempotency_window,
        }
    }

    /// Persist a message and fan it out to the conversation's room
    pub async fn send(
        &self,
        sender: Sender,
        conversation_id: Uuid,
        request: SendRequest,
    ) -> Result<SendReceipt, DispatchError> {
        validate_content(&request.content)?;
        let idempotency_key = validate_idempotency_key(request.idempotency_key)?;

        let _guard = self.locks.acquire(conversation_id).await;

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await
            .map_err(transient)?
            .filter(|c| sender.can_see(c))
            .ok_or(DispatchError::ConversationNotFound)?;

        if let Some(key) = idempotency_key.as_deref() {
            let not_before = OffsetDateTime::now_utc() - self.idempotency_window;
            if let Some(original) = self
                .store
                .find_by_idempotency_key(conversation_id, key, not_before)
                .await
                .map_err(transient)?
            {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    message_id = original.id,
                    idempotency_key = %key,
                    "Duplicate send; returning original message"
                );
                return Ok(SendReceipt {
                    message: original,
                    replayed: true,
                });
            }
        }

        if sender.kind() != SenderKind::Contact && !conversation.is_open() {
            return Err(DispatchError::ConversationClosed);
        }

        let (message, conversation) = self
            .store
            .append_message(NewMessage {
                conversation_id,
                sender_kind: sender.kind(),
                sender_id: sender.sender_id(),
                content: request.content,
                idempotency_key,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(transient)?;

        let recipients = self
            .registry
            .broadcast(
                conversation_id,
                ServerEvent::MessageNew {
                    conversation_id,
                    message: message.clone(),
                    conversation: conversation.clone(),
                },
            )
            .await;

        if sender.kind() == SenderKind::Agent {
            self.outbox
                .enqueue(OutboundMessage::new(&conversation, message.clone()));
        }

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = message.id,
            sender_kind = %message.sender_kind,
            recipients,
            "Message dispatched"
        );

        Ok(SendReceipt {
            message,
            replayed: false,
        })
    }

    /// Move a message's delivery status forward. Earlier-or-equal requests are no-ops.
    pub async fn update_status(
        &self,
        company_id: Uuid,
        message_id: MessageId,
        status: DeliveryStatus,
    ) -> Result<Message, DispatchError> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(DispatchError::MessageNotFound)?;

        let _guard = self.locks.acquire(message.conversation_id).await;

        let visible = self
            .store
            .get_conversation(message.conversation_id)
            .await?
            .is_some_and(|c| c.company_id == company_id);
        if !visible {
            return Err(DispatchError::MessageNotFound);
        }

        match self
            .store
            .advance_message_status(message_id, status)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => DispatchError::MessageNotFound,
                other => other.into(),
            })? {
            StatusUpdate::Advanced(message) => {
                self.registry
                    .broadcast(
                        message.conversation_id,
                        ServerEvent::MessageStatus {
                            message_id: message.id,
                            status: message.status,
                        },
                    )
                    .await;
                tracing::debug!(message_id, status = %message.status, "Delivery status advanced");
                Ok(message)
            }
            StatusUpdate::Unchanged(message) => {
                if let Err(conflict) = message.status.advance(status) {
                    tracing::debug!(message_id, error = %conflict, "Ignoring status update");
                }
                Ok(message)
            }
        }
    }

    /// Change assignment, status, or tags and broadcast the new projection
    pub async fn update_conversation(
        &self,
        company_id: Uuid,
        conversation_id: Uuid,
        patch: ConversationPatch,
    ) -> Result<Conversation, DispatchError> {
        if patch.is_empty() {
            return Err(DispatchError::Validation(
                "At least one of status, assignedAgentId, or tags is required".to_string(),
            ));
        }

        let _guard = self.locks.acquire(conversation_id).await;
        let mut conversation = self.load_scoped(company_id, conversation_id).await?;

        conversation.apply(&patch, OffsetDateTime::now_utc());
        self.store.save_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %conversation_id,
            status = %conversation.status,
            assigned_agent_id = ?conversation.assigned_agent_id,
            "Conversation updated"
        );
        self.publish_conversation(&conversation).await;
        Ok(conversation)
    }

    /// Reset the unread counter and broadcast the new projection
    pub async fn mark_read(
        &self,
        company_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation, DispatchError> {
        let _guard = self.locks.acquire(conversation_id).await;
        let mut conversation = self.load_scoped(company_id, conversation_id).await?;

        conversation.mark_read(OffsetDateTime::now_utc());
        self.store.save_conversation(&conversation).await?;

        self.publish_conversation(&conversation).await;
        Ok(conversation)
    }

    /// Conversations of a company, most recent activity first
    pub async fn list_conversations(&self, company_id: Uuid) -> Result<Vec<Conversation>, DispatchError> {
        Ok(self.store.list_conversations(company_id).await?)
    }

    /// Timeline of a conversation in id order
    pub async fn list_messages(
        &self,
        company_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>, DispatchError> {
        self.load_scoped(company_id, conversation_id).await?;
        Ok(self.store.list_messages(conversation_id).await?)
    }

    /// A conversation of `company_id` whose contact is `contact_id`
    pub async fn find_contact_conversation(
        &self,
        company_id: Uuid,
        contact_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation, DispatchError> {
        let conversation = self.load_scoped(company_id, conversation_id).await?;
        if conversation.contact_id != contact_id {
            return Err(DispatchError::ConversationNotFound);
        }
        Ok(conversation)
    }

    async fn load_scoped(
        &self,
        company_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation, DispatchError> {
        self.store
            .get_conversation(conversation_id)
            .await?
            .filter(|c| c.company_id == company_id)
            .ok_or(DispatchError::ConversationNotFound)
    }

    async fn publish_conversation(&self, conversation: &Conversation) {
        self.registry
            .broadcast(
                conversation.id,
                ServerEvent::ConversationUpdated {
                    conversation: conversation.clone(),
                },
            )
            .await;
    }
}

fn transient(err: StoreError) -> DispatchError {
    match err {
        StoreError::Unavailable(e) => {
            tracing::warn!(error = %e, "Send failed: store unavailable");
            DispatchError::TransientSendFailure(e)
        }
        other => other.into(),
    }
}

fn validate_content(content: &str) -> Result<(), DispatchError> {
    if content.trim().is_empty() {
        return Err(DispatchError::Validation("Message content is empty".to_string()));
    }
    if content.chars().count() > MESSAGE_MAX_CHARS {
        return Err(DispatchError::Validation(format!(
            "Message content exceeds {MESSAGE_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_idempotency_key(key: Option<String>) -> Result<Option<String>, DispatchError> {
    match key {
        None => Ok(None),
        Some(key) => {
            let key = key.trim();
            if key.is_empty() || key.len() > IDEMPOTENCY_KEY_MAX_LEN {
                return Err(DispatchError::Validation(format!(
                    "Idempotency key must be 1-{IDEMPOTENCY_KEY_MAX_LEN} bytes"
                )));
            }
            Ok(Some(key.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::presence::PresenceTracker;
    use crate::store::InMemoryStore;
    use crate::websocket::connection::tests::context;
    use outbox::RecordingChannel;
    use parley_shared::ConversationStatus;
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: Arc<MessageDispatcher>,
        store: Arc<InMemoryStore>,
        channel: Arc<RecordingChannel>,
        conversation: Conversation,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Harness {
        fn agent(&self) -> Sender {
            Sender::Agent {
                company_id: self.conversation.company_id,
                user_id: Uuid::new_v4(),
            }
        }

        fn contact(&self) -> Sender {
            Sender::Contact {
                company_id: self.conversation.company_id,
                contact_id: self.conversation.contact_id,
            }
        }

        fn events(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    async fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let registry = SessionRegistry::new(store.clone(), Arc::new(PresenceTracker::default()));
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = Arc::new(MessageDispatcher::new(
            store.clone(),
            registry.clone(),
            ChannelOutbox::spawn(channel.clone()),
            Duration::from_secs(86_400),
        ));

        let conversation = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conversation).await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let viewer = registry
            .register(context(conversation.company_id, Uuid::new_v4()), tx)
            .await;
        assert!(registry.join_room(&viewer, conversation.id).await);

        Harness {
            dispatcher,
            store,
            channel,
            conversation,
            rx,
        }
    }

    fn text(content: &str) -> SendRequest {
        SendRequest {
            content: content.to_string(),
            idempotency_key: None,
        }
    }

    fn keyed(content: &str, key: &str) -> SendRequest {
        SendRequest {
            content: content.to_string(),
            idempotency_key: Some(key.to_string()),
        }
    }

    #[tokio::test]
    async fn test_send_persists_and_broadcasts() {
        let mut h = harness().await;

        let receipt = h
            .dispatcher
            .send(h.agent(), h.conversation.id, text("Hello there"))
            .await
            .unwrap();

        assert!(!receipt.replayed);
        assert_eq!(receipt.message.status, DeliveryStatus::Sent);
        match h.events().as_slice() {
            [ServerEvent::MessageNew {
                message,
                conversation,
                ..
            }] => {
                assert_eq!(message.id, receipt.message.id);
                assert_eq!(conversation.last_message_preview.as_deref(), Some("Hello there"));
                assert_eq!(conversation.unread_count, 0);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_sends_broadcast_in_id_order() {
        let mut h = harness().await;

        let mut tasks = Vec::new();
        for n in 0..20 {
            let dispatcher = Arc::clone(&h.dispatcher);
            let sender = h.agent();
            let conversation_id = h.conversation.id;
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .send(sender, conversation_id, text(&format!("message {n}")))
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let ids: Vec<MessageId> = h
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::MessageNew { message, .. } => Some(message.id),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 20);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_duplicate_key_returns_original_without_broadcast() {
        let mut h = harness().await;

        let first = h
            .dispatcher
            .send(h.contact(), h.conversation.id, keyed("Hello", "abc123"))
            .await
            .unwrap();
        let second = h
            .dispatcher
            .send(h.contact(), h.conversation.id, keyed("Hello", "abc123"))
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(first.message, second.message);
        assert_eq!(h.events().len(), 1);
        assert_eq!(h.store.list_messages(h.conversation.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_keys_persist_once() {
        let h = harness().await;

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let dispatcher = Arc::clone(&h.dispatcher);
            let sender = h.contact();
            let conversation_id = h.conversation.id;
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .send(sender, conversation_id, keyed("retry me", "k-1"))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().message.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized_content() {
        let h = harness().await;

        let empty = h.dispatcher.send(h.agent(), h.conversation.id, text("   ")).await;
        assert!(matches!(empty, Err(DispatchError::Validation(_))));

        let long = "x".repeat(MESSAGE_MAX_CHARS + 1);
        let oversized = h.dispatcher.send(h.agent(), h.conversation.id, text(&long)).await;
        assert!(matches!(oversized, Err(DispatchError::Validation(_))));

        let exact = "x".repeat(MESSAGE_MAX_CHARS);
        assert!(h.dispatcher.send(h.agent(), h.conversation.id, text(&exact)).await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_company_cannot_send() {
        let mut h = harness().await;
        let outsider = Sender::Agent {
            company_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };

        let result = h.dispatcher.send(outsider, h.conversation.id, text("hi")).await;

        assert!(matches!(result, Err(DispatchError::ConversationNotFound)));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_agent_cannot_write_to_resolved_conversation() {
        let h = harness().await;
        let patch = ConversationPatch {
            status: Some(ConversationStatus::Resolved),
            ..Default::default()
        };
        h.dispatcher
            .update_conversation(h.conversation.company_id, h.conversation.id, patch)
            .await
            .unwrap();

        let result = h.dispatcher.send(h.agent(), h.conversation.id, text("hi")).await;
        assert!(matches!(result, Err(DispatchError::ConversationClosed)));
    }

    #[tokio::test]
    async fn test_contact_message_reopens_and_counts_unread() {
        let h = harness().await;
        let patch = ConversationPatch {
            status: Some(ConversationStatus::Resolved),
            ..Default::default()
        };
        h.dispatcher
            .update_conversation(h.conversation.company_id, h.conversation.id, patch)
            .await
            .unwrap();

        h.dispatcher
            .send(h.contact(), h.conversation.id, text("one more thing"))
            .await
            .unwrap();

        let conversation = h.store.get_conversation(h.conversation.id).await.unwrap().unwrap();
        assert_eq!(conversation.status, ConversationStatus::Open);
        assert_eq!(conversation.unread_count, 1);
    }

    #[tokio::test]
    async fn test_contact_scoped_to_company_and_conversation() {
        let h = harness().await;

        let foreign = Sender::Contact {
            company_id: Uuid::new_v4(),
            contact_id: h.conversation.contact_id,
        };
        let result = h.dispatcher.send(foreign, h.conversation.id, text("hi")).await;
        assert!(matches!(result, Err(DispatchError::ConversationNotFound)));

        let stranger = Sender::Contact {
            company_id: h.conversation.company_id,
            contact_id: Uuid::new_v4(),
        };
        let result = h.dispatcher.send(stranger, h.conversation.id, text("hi")).await;
        assert!(matches!(result, Err(DispatchError::ConversationNotFound)));

        assert!(h
            .dispatcher
            .find_contact_conversation(h.conversation.company_id, Uuid::new_v4(), h.conversation.id)
            .await
            .is_err());
        let found = h
            .dispatcher
            .find_contact_conversation(
                h.conversation.company_id,
                h.conversation.contact_id,
                h.conversation.id,
            )
            .await
            .unwrap();
        assert_eq!(found.id, h.conversation.id);
    }

    #[tokio::test]
    async fn test_only_agent_messages_reach_contact_channel() {
        let h = harness().await;

        h.dispatcher
            .send(h.contact(), h.conversation.id, text("question"))
            .await
            .unwrap();
        let reply = h
            .dispatcher
            .send(h.agent(), h.conversation.id, text("answer"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let delivered = h.channel.delivered.lock().await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message.id, reply.message.id);
        assert_eq!(delivered[0].contact_id, h.conversation.contact_id);
    }

    #[tokio::test]
    async fn test_store_outage_is_transient_and_silent() {
        let mut h = harness().await;
        h.store.set_unavailable(true);

        let result = h.dispatcher.send(h.agent(), h.conversation.id, text("hi")).await;

        assert!(matches!(result, Err(DispatchError::TransientSendFailure(_))));
        assert!(h.events().is_empty());

        h.store.set_unavailable(false);
        assert!(h.dispatcher.send(h.agent(), h.conversation.id, text("hi")).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let mut h = harness().await;
        let company_id = h.conversation.company_id;
        let sent = h
            .dispatcher
            .send(h.agent(), h.conversation.id, text("hi"))
            .await
            .unwrap()
            .message;
        h.events();

        let read = h
            .dispatcher
            .update_status(company_id, sent.id, DeliveryStatus::Read)
            .await
            .unwrap();
        assert_eq!(read.status, DeliveryStatus::Read);

        let stale = h
            .dispatcher
            .update_status(company_id, sent.id, DeliveryStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(stale.status, DeliveryStatus::Read);

        assert_eq!(
            h.events(),
            vec![ServerEvent::MessageStatus {
                message_id: sent.id,
                status: DeliveryStatus::Read,
            }]
        );
    }

    #[tokio::test]
    async fn test_status_update_is_tenant_scoped() {
        let h = harness().await;
        let sent = h
            .dispatcher
            .send(h.agent(), h.conversation.id, text("hi"))
            .await
            .unwrap()
            .message;

        let result = h
            .dispatcher
            .update_status(Uuid::new_v4(), sent.id, DeliveryStatus::Delivered)
            .await;
        assert!(matches!(result, Err(DispatchError::MessageNotFound)));

        let missing = h
            .dispatcher
            .update_status(h.conversation.company_id, 9_999, DeliveryStatus::Delivered)
            .await;
        assert!(matches!(missing, Err(DispatchError::MessageNotFound)));
    }

    #[tokio::test]
    async fn test_update_conversation_broadcasts_projection() {
        let mut h = harness().await;
        let agent_id = Uuid::new_v4();
        let patch = ConversationPatch {
            assigned_agent_id: Some(Some(agent_id)),
            tags: Some(vec!["vip".to_string(), "billing".to_string(), "vip".to_string()]),
            ..Default::default()
        };

        let updated = h
            .dispatcher
            .update_conversation(h.conversation.company_id, h.conversation.id, patch)
            .await
            .unwrap();

        assert_eq!(updated.assigned_agent_id, Some(agent_id));
        assert_eq!(updated.tags, vec!["billing", "vip"]);
        assert_eq!(
            h.events(),
            vec![ServerEvent::ConversationUpdated {
                conversation: updated
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_patch_is_rejected() {
        let h = harness().await;
        let result = h
            .dispatcher
            .update_conversation(
                h.conversation.company_id,
                h.conversation.id,
                ConversationPatch::default(),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::Validation(_))));
    }

    #[tokio::test]
    async fn test_mark_read_resets_unread() {
        let mut h = harness().await;
        for n in 0..3 {
            h.dispatcher
                .send(h.contact(), h.conversation.id, text(&format!("q{n}")))
                .await
                .unwrap();
        }
        h.events();

        let conversation = h
            .dispatcher
            .mark_read(h.conversation.company_id, h.conversation.id)
            .await
            .unwrap();

        assert_eq!(conversation.unread_count, 0);
        assert!(matches!(
            h.events().as_slice(),
            [ServerEvent::ConversationUpdated { conversation }] if conversation.unread_count == 0
        ));
    }

    #[tokio::test]
    async fn test_list_messages_is_scoped() {
        let h = harness().await;
        h.dispatcher
            .send(h.contact(), h.conversation.id, text("hi"))
            .await
            .unwrap();

        let own = h
            .dispatcher
            .list_messages(h.conversation.company_id, h.conversation.id)
            .await
            .unwrap();
        assert_eq!(own.len(), 1);

        let foreign = h.dispatcher.list_messages(Uuid::new_v4(), h.conversation.id).await;
        assert!(matches!(foreign, Err(DispatchError::ConversationNotFound)));
    }
}
