//! Message delivery-status routes
//!
//! Channel adapters report `delivered`/`read` here; agents' clients report
//! reads of contact messages.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use parley_shared::{DeliveryStatus, Message, MessageId};
use serde::Deserialize;

use crate::{auth::SessionContext, error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
}

/// Advance a message's delivery status. Stale updates return the current message.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(message_id): Path<MessageId>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Message>> {
    let message = state
        .dispatcher
        .update_status(ctx.company_id, message_id, req.status)
        .await?;
    Ok(Json(message))
}
