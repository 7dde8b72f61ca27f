//! Room Routes
//!
//! - GET /api/v1/rooms - Local rooms plus the cross-instance presence view
//! - GET /api/v1/rooms/:room - One local room

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::hub_snapshot;
use crate::api::dto::{RoomSummary, RoomsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> ApiResult<Json<RoomsResponse>> {
    let snapshot = hub_snapshot(&state).await?;

    let presence = match &state.presence {
        Some(presence) => match presence.active_rooms().await {
            Ok(rooms) => Some(rooms),
            Err(e) => {
                tracing::warn!(error = %e, "Presence unavailable, listing local rooms only");
                None
            }
        },
        None => None,
    };

    Ok(Json(RoomsResponse::from_snapshot(snapshot, presence)))
}

/// GET /api/v1/rooms/:room
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<RoomSummary>> {
    let snapshot = hub_snapshot(&state).await?;

    match snapshot.members(&room) {
        Some(members) => Ok(Json(RoomSummary {
            name: room,
            members,
        })),
        None => Err(ApiError::NotFound(format!("room {:?} has no members here", room))),
    }
}
