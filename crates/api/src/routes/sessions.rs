//! Session administration routes

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::SessionContext,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// How long a revoked token id is remembered when its expiry is unknown
const REVOKED_TOKEN_RETENTION: time::Duration = time::Duration::days(7);

/// Exactly one of `userId` or `tokenId`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub token_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    /// Live sessions that were force-closed
    pub disconnected: usize,
}

/// Force-disconnect a user's sessions or every session of one token (admin only).
/// The credential is also rejected on any later reconnect.
pub async fn revoke(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(req): Json<RevokeRequest>,
) -> ApiResult<Json<RevokeResponse>> {
    if !ctx.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let disconnected = match (req.user_id, req.token_id) {
        (Some(user_id), None) => {
            state.auth.revocations().revoke_user(ctx.company_id, user_id).await;
            state.registry.revoke_user(ctx.company_id, user_id).await
        }
        (None, Some(token_id)) if !token_id.trim().is_empty() => {
            let retain_until = (OffsetDateTime::now_utc() + REVOKED_TOKEN_RETENTION).unix_timestamp();
            state
                .auth
                .revocations()
                .revoke_token(ctx.company_id, &token_id, retain_until)
                .await;
            state.registry.revoke_token(ctx.company_id, &token_id).await
        }
        _ => {
            return Err(ApiError::Validation(
                "Provide exactly one of userId or tokenId".to_string(),
            ))
        }
    };

    tracing::info!(
        admin_id = %ctx.user_id,
        company_id = %ctx.company_id,
        disconnected,
        "Sessions revoked"
    );

    Ok(Json(RevokeResponse { disconnected }))
}
