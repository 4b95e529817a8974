//! Per-conversation message timeline with optimistic entries
//!
//! Confirmed entries are always in ascending id order. Pending and failed
//! entries sit where the user created them, normally at the tail.

use std::collections::BTreeMap;

use parley_shared::{DeliveryStatus, Message, MessageId};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ProjectionError;

/// A locally created message the server has not confirmed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub temp_id: String,
    pub conversation_id: Uuid,
    pub content: String,
    /// Sent with the request and echoed back on the authoritative message
    pub idempotency_key: String,
    pub created_at: OffsetDateTime,
}

impl PendingMessage {
    /// Request body for `POST /conversations/:id/messages`
    pub fn request(&self) -> OutgoingMessage<'_> {
        OutgoingMessage {
            content: &self.content,
            idempotency_key: &self.idempotency_key,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage<'a> {
    pub content: &'a str,
    pub idempotency_key: &'a str,
}

/// One timeline entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMessage {
    /// Awaiting the server; shown as `sending`
    Pending(PendingMessage),
    /// Authoritative copy from the server
    Confirmed(Message),
    /// The send failed transiently; can be retried with the same key
    Failed {
        message: PendingMessage,
        reason: String,
    },
}

impl LocalMessage {
    pub fn confirmed_id(&self) -> Option<MessageId> {
        match self {
            LocalMessage::Confirmed(m) => Some(m.id),
            _ => None,
        }
    }

    pub fn temp_id(&self) -> Option<&str> {
        match self {
            LocalMessage::Pending(p) | LocalMessage::Failed { message: p, .. } => Some(&p.temp_id),
            LocalMessage::Confirmed(_) => None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            LocalMessage::Pending(p) | LocalMessage::Failed { message: p, .. } => &p.content,
            LocalMessage::Confirmed(m) => &m.content,
        }
    }

    /// Delivery status to display; `None` for failed sends
    pub fn status(&self) -> Option<DeliveryStatus> {
        match self {
            LocalMessage::Pending(_) => Some(DeliveryStatus::Sending),
            LocalMessage::Confirmed(m) => Some(m.status),
            LocalMessage::Failed { .. } => None,
        }
    }

    /// Key of an unconfirmed entry
    fn unconfirmed_key(&self) -> Option<&str> {
        match self {
            LocalMessage::Pending(p) | LocalMessage::Failed { message: p, .. } => {
                Some(&p.idempotency_key)
            }
            LocalMessage::Confirmed(_) => None,
        }
    }
}

/// How an authoritative message was merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Took over an optimistic entry
    Replaced,
    /// No optimistic entry matched; inserted in id order
    Inserted,
    /// Already present; nothing changed
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    entries: Vec<LocalMessage>,
}

impl Timeline {
    pub fn entries(&self) -> &[LocalMessage] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push_pending(&mut self, pending: PendingMessage) {
        self.entries.push(LocalMessage::Pending(pending));
    }

    pub fn contains_id(&self, id: MessageId) -> bool {
        self.entries.iter().any(|e| e.confirmed_id() == Some(id))
    }

    /// Merge an authoritative message
    pub fn confirm(&mut self, message: Message) -> Merge {
        if self.contains_id(message.id) {
            return Merge::Duplicate;
        }

        let matched = message.idempotency_key.as_deref().and_then(|key| {
            self.entries
                .iter()
                .position(|e| e.unconfirmed_key() == Some(key))
        });

        match matched {
            Some(index) if self.fits_at(index, message.id) => {
                self.entries[index] = LocalMessage::Confirmed(message);
                Merge::Replaced
            }
            Some(index) => {
                self.entries.remove(index);
                self.insert_in_order(message);
                Merge::Replaced
            }
            None => {
                self.insert_in_order(message);
                Merge::Inserted
            }
        }
    }

    /// Move a confirmed message's status forward. Returns whether it changed.
    pub fn advance_status(&mut self, id: MessageId, status: DeliveryStatus) -> bool {
        for entry in &mut self.entries {
            if let LocalMessage::Confirmed(message) = entry {
                if message.id == id {
                    return match message.status.advance(status) {
                        Ok(next) => {
                            message.status = next;
                            true
                        }
                        Err(_) => false,
                    };
                }
            }
        }
        false
    }

    pub fn mark_failed(&mut self, temp_id: &str, reason: &str) -> Result<(), ProjectionError> {
        let entry = self.find_unconfirmed(temp_id)?;
        if let LocalMessage::Pending(pending) = entry {
            *entry = LocalMessage::Failed {
                message: pending.clone(),
                reason: reason.to_string(),
            };
        }
        Ok(())
    }

    /// Return a failed entry to pending, keeping its idempotency key
    pub fn retry(&mut self, temp_id: &str) -> Result<PendingMessage, ProjectionError> {
        let entry = self.find_unconfirmed(temp_id)?;
        match entry {
            LocalMessage::Failed { message, .. } => {
                let pending = message.clone();
                *entry = LocalMessage::Pending(pending.clone());
                Ok(pending)
            }
            LocalMessage::Pending(_) => Err(ProjectionError::NotFailed(temp_id.to_string())),
            LocalMessage::Confirmed(_) => Err(ProjectionError::UnknownTempId(temp_id.to_string())),
        }
    }

    /// Replace confirmed entries with a fetched timeline, keeping local
    /// optimistic entries the server has not seen.
    pub fn load(&mut self, fetched: Vec<Message>) {
        let mut confirmed: BTreeMap<MessageId, Message> =
            fetched.into_iter().map(|m| (m.id, m)).collect();

        let mut unconfirmed = Vec::new();
        for entry in self.entries.drain(..) {
            match entry {
                LocalMessage::Confirmed(local) => {
                    // Keep live updates newer than the fetch
                    let slot = confirmed.entry(local.id).or_insert_with(|| local.clone());
                    if local.status > slot.status {
                        slot.status = local.status;
                    }
                }
                other => unconfirmed.push(other),
            }
        }

        unconfirmed.retain(|entry| {
            let key = entry.unconfirmed_key();
            !confirmed
                .values()
                .any(|m| key.is_some() && m.idempotency_key.as_deref() == key)
        });

        self.entries = confirmed
            .into_values()
            .map(LocalMessage::Confirmed)
            .chain(unconfirmed)
            .collect();
    }

    fn find_unconfirmed(&mut self, temp_id: &str) -> Result<&mut LocalMessage, ProjectionError> {
        self.entries
            .iter_mut()
            .find(|e| e.temp_id() == Some(temp_id))
            .ok_or_else(|| ProjectionError::UnknownTempId(temp_id.to_string()))
    }

    /// Whether `id` at `index` keeps confirmed entries in id order
    fn fits_at(&self, index: usize, id: MessageId) -> bool {
        let before = self.entries[..index]
            .iter()
            .rev()
            .find_map(LocalMessage::confirmed_id);
        let after = self.entries[index + 1..]
            .iter()
            .find_map(LocalMessage::confirmed_id);
        before.map_or(true, |b| b < id) && after.map_or(true, |a| a > id)
    }

    /// Insert before the first later confirmed entry, or after the last
    /// confirmed entry (ahead of trailing optimistic ones)
    fn insert_in_order(&mut self, message: Message) {
        let index = match self
            .entries
            .iter()
            .position(|e| e.confirmed_id().is_some_and(|id| id > message.id))
        {
            Some(index) => index,
            None => self
                .entries
                .iter()
                .rposition(|e| e.confirmed_id().is_some())
                .map_or(0, |last| last + 1),
        };
        self.entries.insert(index, LocalMessage::Confirmed(message));
    }
}
