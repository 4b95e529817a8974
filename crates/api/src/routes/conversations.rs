//! Conversation routes
//!
//! Request/response surface over the [`crate::dispatcher::MessageDispatcher`].
//! Every handler is scoped to the caller's company.

use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use parley_shared::{Conversation, ConversationPatch, Message};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::SessionContext,
    dispatcher::{SendRequest, Sender},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Header carrying a client-generated idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// List the caller's conversations, most recent activity first
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state.dispatcher.list_conversations(ctx.company_id).await?;
    Ok(Json(conversations))
}

/// Full timeline of a conversation in id order
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state
        .dispatcher
        .list_messages(ctx.company_id, conversation_id)
        .await?;
    Ok(Json(messages))
}

/// Send an agent message.
///
/// Returns 201 for a new message and 200 when the idempotency key matched an
/// earlier send.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|v| {
            v.to_str()
                .map(str::to_string)
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".into()))
        })
        .transpose()?;

    let receipt = state
        .dispatcher
        .send(
            Sender::agent(&ctx),
            conversation_id,
            SendRequest {
                content: req.content,
                idempotency_key: req.idempotency_key.or(header_key),
            },
        )
        .await?;

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt.message)))
}

/// Change status, assignment, or tags
pub async fn update_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
    Json(patch): Json<ConversationPatch>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .dispatcher
        .update_conversation(ctx.company_id, conversation_id, patch)
        .await?;

    tracing::info!(
        conversation_id = %conversation_id,
        user_id = %ctx.user_id,
        "Agent updated conversation"
    );
    Ok(Json(conversation))
}

/// Reset the unread counter
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    let conversation = state
        .dispatcher
        .mark_read(ctx.company_id, conversation_id)
        .await?;
    Ok(Json(conversation))
}
