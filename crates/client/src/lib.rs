//! Parley Client
//!
//! Agent-side projection of conversations kept in sync with the server's
//! event stream, with optimistic sends.

pub mod projection;
pub mod timeline;

pub use projection::{ConversationProjection, Reconciled};
pub use timeline::{LocalMessage, Merge, OutgoingMessage, PendingMessage, Timeline};

/// Errors from local projection operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("No unconfirmed message with temp id {0}")]
    UnknownTempId(String),

    #[error("Message {0} has not failed")]
    NotFailed(String),
}
