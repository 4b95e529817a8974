//! Conversation and message types used across Parley

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ConflictError, ParseEnumError};

/// Server-assigned message id. Strictly increasing, never reused.
pub type MessageId = i64;

/// Maximum characters kept in a conversation's last-message preview
pub const PREVIEW_MAX_CHARS: usize = 120;

/// Maximum characters accepted in a single message body
pub const MESSAGE_MAX_CHARS: usize = 10_000;

// =============================================================================
// Enums
// =============================================================================

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Open,
    Resolved,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "resolved" => Ok(Self::Resolved),
            other => Err(ParseEnumError::new("conversation status", other)),
        }
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Agent,
    Contact,
    System,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Contact => "contact",
            Self::System => "system",
        }
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "contact" => Ok(Self::Contact),
            "system" => Ok(Self::System),
            other => Err(ParseEnumError::new("sender kind", other)),
        }
    }
}

/// Message delivery status.
///
/// Ordered: `Sending < Sent < Delivered < Read`. Transitions only move forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    /// Position in the forward-only order, starting at 0 for `Sending`
    pub fn rank(self) -> i16 {
        self as i16
    }

    /// Move to `requested` if it is strictly later than the current status
    pub fn advance(self, requested: DeliveryStatus) -> Result<DeliveryStatus, ConflictError> {
        if requested > self {
            Ok(requested)
        } else {
            Err(ConflictError::StatusNotForward {
                current: self,
                requested,
            })
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(ParseEnumError::new("delivery status", other)),
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A single message in a conversation timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: Uuid,
    pub sender_kind: SenderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,
    pub content: String,
    pub status: DeliveryStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Conversation summary as shown in inbox lists.
///
/// Always transmitted whole; receivers replace their copy instead of merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub contact_id: Uuid,
    #[serde(default)]
    pub assigned_agent_id: Option<Uuid>,
    pub status: ConversationStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub last_message_preview: Option<String>,
    pub unread_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    /// Create an open, empty conversation for a contact
    pub fn new(company_id: Uuid, contact_id: Uuid) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            company_id,
            contact_id,
            assigned_agent_id: None,
            status: ConversationStatus::Open,
            last_message_at: None,
            last_message_preview: None,
            unread_count: 0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ConversationStatus::Open
    }

    /// Fold a newly persisted message into the summary.
    ///
    /// Contact messages bump the unread counter and reopen a resolved conversation.
    pub fn record_message(&mut self, message: &Message) {
        self.last_message_at = Some(message.created_at);
        self.last_message_preview = Some(preview(&message.content));
        self.updated_at = message.created_at;

        if message.sender_kind == SenderKind::Contact {
            self.unread_count = self.unread_count.saturating_add(1);
            self.status = ConversationStatus::Open;
        }
    }

    /// Reset the unread counter
    pub fn mark_read(&mut self, now: OffsetDateTime) {
        self.unread_count = 0;
        self.updated_at = now;
    }

    /// Apply an assignment/status/tag change
    pub fn apply(&mut self, patch: &ConversationPatch, now: OffsetDateTime) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(assignee) = patch.assigned_agent_id {
            self.assigned_agent_id = assignee;
        }
        if let Some(tags) = &patch.tags {
            self.tags = normalize_tags(tags);
        }
        self.updated_at = now;
    }
}

/// Requested change to a conversation's assignment, status or tags.
///
/// `assigned_agent_id` distinguishes "leave unchanged" (`None`) from "unassign" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(default)]
    pub status: Option<ConversationStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_agent_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl ConversationPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assigned_agent_id.is_none() && self.tags.is_none()
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Helpers
// =============================================================================

/// Truncate message content for list previews, on a char boundary
pub fn preview(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Trim, drop empties, de-duplicate and sort a tag list
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn message(kind: SenderKind, content: &str) -> Message {
        Message {
            id: 1,
            conversation_id: Uuid::new_v4(),
            sender_kind: kind,
            sender_id: None,
            content: content.to_string(),
            status: DeliveryStatus::Sent,
            created_at: OffsetDateTime::now_utc(),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_delivery_status_only_moves_forward() {
        assert_eq!(
            DeliveryStatus::Sent.advance(DeliveryStatus::Delivered),
            Ok(DeliveryStatus::Delivered)
        );
        assert!(matches!(
            DeliveryStatus::Delivered.advance(DeliveryStatus::Sent),
            Err(ConflictError::StatusNotForward { .. })
        ));
        assert!(DeliveryStatus::Read.advance(DeliveryStatus::Read).is_err());
    }

    #[test]
    fn test_delivery_status_parse() {
        assert_eq!("read".parse::<DeliveryStatus>(), Ok(DeliveryStatus::Read));
        assert!("bounced".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_contact_message_increments_unread_and_reopens() {
        let mut conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        conv.status = ConversationStatus::Resolved;

        conv.record_message(&message(SenderKind::Contact, "hi there"));

        assert_eq!(conv.unread_count, 1);
        assert_eq!(conv.status, ConversationStatus::Open);
        assert_eq!(conv.last_message_preview.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_agent_message_leaves_unread_alone() {
        let mut conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        conv.record_message(&message(SenderKind::Agent, "hello"));
        assert_eq!(conv.unread_count, 0);
        assert!(conv.last_message_at.is_some());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(PREVIEW_MAX_CHARS + 10);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn test_patch_distinguishes_unassign_from_absent() {
        let absent: ConversationPatch = serde_json::from_str(r#"{"status":"resolved"}"#).unwrap();
        assert_eq!(absent.assigned_agent_id, None);

        let unassign: ConversationPatch =
            serde_json::from_str(r#"{"assignedAgentId":null}"#).unwrap();
        assert_eq!(unassign.assigned_agent_id, Some(None));
    }

    #[test]
    fn test_apply_patch_normalizes_tags() {
        let mut conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        let patch = ConversationPatch {
            tags: Some(vec!["vip".into(), " billing ".into(), "vip".into(), "".into()]),
            ..Default::default()
        };
        conv.apply(&patch, OffsetDateTime::now_utc());
        assert_eq!(conv.tags, vec!["billing".to_string(), "vip".to_string()]);
    }
}
