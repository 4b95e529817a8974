//! Parley Shared Types
//!
//! Domain types, wire events and errors shared by the sync server and its clients.

pub mod error;
pub mod events;
pub mod types;

pub use error::*;
pub use events::{ClientEvent, ServerEvent};
pub use types::*;
