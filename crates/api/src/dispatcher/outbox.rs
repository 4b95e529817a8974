//! Outbound delivery of agent messages to the contact's channel
//!
//! Channel adapters (email, SMS, chat widgets) live outside this service and
//! sit behind [`ContactChannel`]. A single worker drains the outbox, so a
//! conversation's messages reach the adapter in the order they were sent.

use std::sync::Arc;

use async_trait::async_trait;
use parley_shared::{Conversation, Message};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel rejected message: {0}")]
    Rejected(String),
    #[error("Channel unreachable: {0}")]
    Unavailable(String),
}

/// An agent message bound for a contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub company_id: Uuid,
    pub contact_id: Uuid,
    pub message: Message,
}

impl OutboundMessage {
    pub fn new(conversation: &Conversation, message: Message) -> Self {
        Self {
            company_id: conversation.company_id,
            contact_id: conversation.contact_id,
            message,
        }
    }
}

#[async_trait]
pub trait ContactChannel: Send + Sync {
    async fn deliver(&self, outbound: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Channel used when no adapter is configured; records the hand-off in the log
pub struct LoggingChannel;

#[async_trait]
impl ContactChannel for LoggingChannel {
    async fn deliver(&self, outbound: &OutboundMessage) -> Result<(), ChannelError> {
        tracing::info!(
            company_id = %outbound.company_id,
            contact_id = %outbound.contact_id,
            conversation_id = %outbound.message.conversation_id,
            message_id = outbound.message.id,
            "Outbound message handed to contact channel"
        );
        Ok(())
    }
}

/// Ordered queue in front of a [`ContactChannel`]
#[derive(Clone)]
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelOutbox {
    /// Start the delivery worker. Must be called inside a Tokio runtime.
    pub fn spawn(channel: Arc<dyn ContactChannel>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();

        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                if let Err(e) = channel.deliver(&outbound).await {
                    // The message stays `sent`; adapters own their retries
                    tracing::warn!(
                        error = %e,
                        conversation_id = %outbound.message.conversation_id,
                        message_id = outbound.message.id,
                        "Contact channel delivery failed"
                    );
                }
            }
            tracing::debug!("Contact channel outbox closed");
        });

        Self { tx }
    }

    pub fn enqueue(&self, outbound: OutboundMessage) {
        if self.tx.send(outbound).is_err() {
            tracing::error!("Contact channel outbox worker is gone; message not forwarded");
        }
    }
}

/// Channel that keeps every delivery, for tests
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingChannel {
    pub(crate) delivered: tokio::sync::Mutex<Vec<OutboundMessage>>,
}

#[cfg(test)]
#[async_trait]
impl ContactChannel for RecordingChannel {
    async fn deliver(&self, outbound: &OutboundMessage) -> Result<(), ChannelError> {
        self.delivered.lock().await.push(outbound.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::{DeliveryStatus, SenderKind};
    use std::time::Duration;
    use time::OffsetDateTime;

    fn message(id: i64, conversation: &Conversation) -> Message {
        Message {
            id,
            conversation_id: conversation.id,
            sender_kind: SenderKind::Agent,
            sender_id: Some(Uuid::new_v4()),
            content: format!("reply {id}"),
            status: DeliveryStatus::Sent,
            created_at: OffsetDateTime::now_utc(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_outbox_delivers_in_order() {
        let channel = Arc::new(RecordingChannel::default());
        let outbox = ChannelOutbox::spawn(channel.clone());
        let conversation = Conversation::new(Uuid::new_v4(), Uuid::new_v4());

        for id in 1..=3 {
            outbox.enqueue(OutboundMessage::new(&conversation, message(id, &conversation)));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let delivered = channel.delivered.lock().await;
        let ids: Vec<i64> = delivered.iter().map(|o| o.message.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(delivered.iter().all(|o| o.contact_id == conversation.contact_id));
    }

    struct FailingChannel;

    #[async_trait]
    impl ContactChannel for FailingChannel {
        async fn deliver(&self, _outbound: &OutboundMessage) -> Result<(), ChannelError> {
            Err(ChannelError::Unavailable("smtp down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_worker() {
        let outbox = ChannelOutbox::spawn(Arc::new(FailingChannel));
        let conversation = Conversation::new(Uuid::new_v4(), Uuid::new_v4());

        outbox.enqueue(OutboundMessage::new(&conversation, message(1, &conversation)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!outbox.tx.is_closed());
    }
}
