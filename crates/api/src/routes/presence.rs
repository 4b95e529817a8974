//! Agent presence routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub agent_id: Uuid,
    pub online: bool,
    /// Seconds since the last heartbeat, if one is on record
    pub last_seen_secs: Option<u64>,
}

pub async fn get_presence(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> ApiResult<Json<PresenceResponse>> {
    let online = state.presence.is_online(agent_id).await;
    let last_seen_secs = state
        .presence
        .last_seen(agent_id)
        .await
        .map(|age| age.as_secs());

    Ok(Json(PresenceResponse {
        agent_id,
        online,
        last_seen_secs,
    }))
}
