//! WebSocket support for real-time conversation sync
//!
//! # Architecture
//!
//! - **Connection**: one authenticated socket and its room memberships
//! - **Room**: conversation-based pub/sub for broadcasting events
//! - **Registry**: all live sessions; tenant-checked room joins; forced disconnects
//! - **Handler**: Axum WebSocket route handler
//!
//! Wire events are defined in `parley_shared::events`.

pub mod connection;
pub mod handler;
pub mod registry;
pub mod room;

pub use connection::{Connection, DisconnectReason};
pub use handler::ws_handler;
pub use registry::{RegistryStats, SessionRegistry};
