//! Error types shared between server and client

use thiserror::Error;

use crate::types::DeliveryStatus;

/// A state change that would move backwards.
///
/// Callers treat this as a no-op: duplicate and racing status reports are expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("Delivery status cannot move from {current} to {requested}")]
    StatusNotForward {
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },
}

/// Unknown textual value for one of the shared enums
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
