//! API routes

pub mod channel;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod presence;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/:conversation_id", patch(conversations::update_conversation))
        .route(
            "/conversations/:conversation_id/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/conversations/:conversation_id/read", post(conversations::mark_read))
        .route("/messages/:message_id/status", post(messages::update_status))
        .route("/agents/:agent_id/presence", get(presence::get_presence))
        .route("/sessions/revoke", post(sessions::revoke))
        .route(
            "/channel/conversations/:conversation_id/messages",
            post(channel::contact_message),
        )
        .route(
            "/channel/conversations/:conversation_id/system-messages",
            post(channel::system_message),
        )
        .route(
            "/channel/conversations/:conversation_id/typing",
            post(channel::contact_typing),
        )
        .layer(middleware::from_fn_with_state(auth_state, require_auth))
        .layer(CompressionLayer::new());

    // WebSocket route (auth handled in handler: header or query token)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1", protected_api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(1024 * 1024)),
        )
        .with_state(state)
}
