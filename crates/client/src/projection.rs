//! Client-side conversation projection
//!
//! Merges authoritative server events into a locally sorted inbox and
//! per-conversation timelines. Single-threaded: every mutation takes
//! `&mut self`.

use std::collections::{BTreeMap, HashMap, HashSet};

use parley_shared::{Conversation, ServerEvent};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::timeline::{LocalMessage, Merge, PendingMessage, Timeline};
use crate::ProjectionError;

/// What a reconciled event changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// An optimistic entry became the authoritative message
    MessageConfirmed,
    /// A message from someone else was added
    MessageInserted,
    /// Already seen; nothing changed
    Duplicate,
    ConversationUpdated,
    StatusAdvanced,
    TypingChanged,
    /// Nothing to apply (stale status, own typing echo, session-level events)
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TypingState {
    contact: bool,
    /// agent id -> display name
    agents: BTreeMap<Uuid, String>,
}

#[derive(Debug, Default)]
pub struct ConversationProjection {
    /// Agent running this client; its own typing echoes are ignored
    agent_id: Option<Uuid>,
    /// Sorted by last activity, newest first
    conversations: Vec<Conversation>,
    timelines: HashMap<Uuid, Timeline>,
    typing: HashMap<Uuid, TypingState>,
    /// Conversations with a mark-read request in flight
    read_requested: HashSet<Uuid>,
    next_temp_id: u64,
}

impl ConversationProjection {
    pub fn new(agent_id: Uuid) -> Self {
        Self {
            agent_id: Some(agent_id),
            ..Self::default()
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn timeline(&self, conversation_id: Uuid) -> &[LocalMessage] {
        self.timelines
            .get(&conversation_id)
            .map(Timeline::entries)
            .unwrap_or_default()
    }

    /// Show a message immediately, before the server has it.
    ///
    /// The returned entry carries the idempotency key to send with the request.
    pub fn apply_optimistic_send(&mut self, conversation_id: Uuid, content: &str) -> PendingMessage {
        self.next_temp_id += 1;
        let pending = PendingMessage {
            temp_id: format!("tmp-{}", self.next_temp_id),
            conversation_id,
            content: content.to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            created_at: OffsetDateTime::now_utc(),
        };

        self.timelines
            .entry(conversation_id)
            .or_default()
            .push_pending(pending.clone());
        pending
    }

    /// The send request failed transiently
    pub fn mark_failed(
        &mut self,
        conversation_id: Uuid,
        temp_id: &str,
        reason: &str,
    ) -> Result<(), ProjectionError> {
        self.timeline_mut(conversation_id, temp_id)?
            .mark_failed(temp_id, reason)
    }

    /// Put a failed entry back to pending; resend the returned message as-is
    pub fn retry(
        &mut self,
        conversation_id: Uuid,
        temp_id: &str,
    ) -> Result<PendingMessage, ProjectionError> {
        self.timeline_mut(conversation_id, temp_id)?.retry(temp_id)
    }

    /// Apply one server event
    pub fn reconcile(&mut self, event: ServerEvent) -> Reconciled {
        match event {
            ServerEvent::MessageNew {
                conversation_id,
                message,
                conversation,
            } => {
                let merge = self
                    .timelines
                    .entry(conversation_id)
                    .or_default()
                    .confirm(message);
                match merge {
                    Merge::Duplicate => Reconciled::Duplicate,
                    Merge::Replaced => {
                        self.upsert_conversation(conversation);
                        Reconciled::MessageConfirmed
                    }
                    Merge::Inserted => {
                        self.upsert_conversation(conversation);
                        Reconciled::MessageInserted
                    }
                }
            }

            ServerEvent::ConversationUpdated { conversation } => {
                self.upsert_conversation(conversation);
                Reconciled::ConversationUpdated
            }

            ServerEvent::MessageStatus { message_id, status } => {
                let advanced = self
                    .timelines
                    .values_mut()
                    .any(|t| t.advance_status(message_id, status));
                if advanced {
                    Reconciled::StatusAdvanced
                } else {
                    Reconciled::Ignored
                }
            }

            ServerEvent::ContactTyping {
                conversation_id,
                is_typing,
            } => {
                self.typing.entry(conversation_id).or_default().contact = is_typing;
                Reconciled::TypingChanged
            }

            ServerEvent::AgentTyping {
                conversation_id,
                agent_id,
                agent_name,
                is_typing,
            } => {
                if self.agent_id == Some(agent_id) {
                    return Reconciled::Ignored;
                }
                let state = self.typing.entry(conversation_id).or_default();
                if is_typing {
                    state.agents.insert(agent_id, agent_name);
                } else {
                    state.agents.remove(&agent_id);
                }
                Reconciled::TypingChanged
            }

            ServerEvent::Connected { .. } => Reconciled::Ignored,
            ServerEvent::Error { message } => {
                tracing::warn!(message = %message, "Server rejected a client event");
                Reconciled::Ignored
            }
        }
    }

    /// Replace a conversation by id (insert if new) and restore sort order
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        if conversation.unread_count == 0 {
            self.read_requested.remove(&conversation.id);
        }

        match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => self.conversations.push(conversation),
        }
        sort_by_recent_activity(&mut self.conversations);
    }

    /// Full-list refresh after a reconnect
    pub fn replace_conversations(&mut self, mut conversations: Vec<Conversation>) {
        sort_by_recent_activity(&mut conversations);
        self.read_requested
            .retain(|id| conversations.iter().any(|c| c.id == *id && c.unread_count > 0));
        self.conversations = conversations;
    }

    /// Merge a fetched timeline, keeping local optimistic entries
    pub fn load_timeline(&mut self, conversation_id: Uuid, messages: Vec<parley_shared::Message>) {
        self.timelines.entry(conversation_id).or_default().load(messages);
    }

    /// Record that the user asked to mark a conversation read.
    ///
    /// Returns whether a request should be sent (false if one is already in
    /// flight or nothing is unread). The unread count itself only changes
    /// when the server's updated conversation arrives.
    pub fn request_mark_read(&mut self, conversation_id: Uuid) -> bool {
        let unread = self
            .conversation(conversation_id)
            .is_some_and(|c| c.unread_count > 0);
        unread && self.read_requested.insert(conversation_id)
    }

    pub fn is_unread(&self, conversation_id: Uuid) -> bool {
        self.conversation(conversation_id)
            .is_some_and(|c| c.unread_count > 0)
    }

    pub fn is_contact_typing(&self, conversation_id: Uuid) -> bool {
        self.typing
            .get(&conversation_id)
            .is_some_and(|t| t.contact)
    }

    /// Names of other agents typing in a conversation
    pub fn typing_agents(&self, conversation_id: Uuid) -> Vec<&str> {
        self.typing
            .get(&conversation_id)
            .map(|t| t.agents.values().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn timeline_mut(
        &mut self,
        conversation_id: Uuid,
        temp_id: &str,
    ) -> Result<&mut Timeline, ProjectionError> {
        self.timelines
            .get_mut(&conversation_id)
            .ok_or_else(|| ProjectionError::UnknownTempId(temp_id.to_string()))
    }
}

/// Newest activity first; conversations without messages last; ties by id
fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
