//! Parley API Library
//!
//! Real-time conversation sync server: session registry, presence, typing
//! indicators, and the message dispatcher, behind REST and WebSocket routes.

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod routes;
pub mod state;
pub mod store;
pub mod typing;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
