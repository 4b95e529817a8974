//! Channel adapter routes
//!
//! Entry point for the service that bridges external messaging channels.
//! Contact messages, system notices, and contact typing arrive here and go
//! through the same dispatcher and typing coordinator as agent activity.
//! Only tokens with the `channel` role may call these routes.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use parley_shared::Message;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::SessionContext,
    dispatcher::{SendRequest, Sender},
    error::{ApiError, ApiResult},
    state::AppState,
    typing::TypingParty,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessageRequest {
    pub contact_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessageRequest {
    pub content: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactTypingRequest {
    pub contact_id: Uuid,
    pub is_typing: bool,
}

fn require_channel(ctx: &SessionContext) -> ApiResult<()> {
    if ctx.is_channel() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Record an inbound contact message. Reopens a resolved conversation.
pub async fn contact_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<ContactMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    require_channel(&ctx)?;

    let sender = Sender::Contact {
        company_id: ctx.company_id,
        contact_id: req.contact_id,
    };
    let receipt = state
        .dispatcher
        .send(
            sender,
            conversation_id,
            SendRequest {
                content: req.content,
                idempotency_key: req.idempotency_key,
            },
        )
        .await?;

    // An inbound message ends any typing indicator the contact still holds
    state
        .typing
        .stop_typing(conversation_id, &TypingParty::Contact { id: req.contact_id })
        .await;

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt.message)))
}

/// Record a system notice, e.g. a channel delivery failure
pub async fn system_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SystemMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    require_channel(&ctx)?;

    let receipt = state
        .dispatcher
        .send(
            Sender::System {
                company_id: ctx.company_id,
            },
            conversation_id,
            SendRequest {
                content: req.content,
                idempotency_key: req.idempotency_key,
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

/// Start or stop the contact's typing indicator
pub async fn contact_typing(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<ContactTypingRequest>,
) -> ApiResult<StatusCode> {
    require_channel(&ctx)?;

    state
        .dispatcher
        .find_contact_conversation(ctx.company_id, req.contact_id, conversation_id)
        .await?;

    let party = TypingParty::Contact { id: req.contact_id };
    if req.is_typing {
        state.typing.start_typing(conversation_id, party).await;
    } else {
        state.typing.stop_typing(conversation_id, &party).await;
    }

    Ok(StatusCode::NO_CONTENT)
}
