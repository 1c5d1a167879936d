// HTTP handlers for room management.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::server::state::AppState;

/// Create a room under a freshly generated shareable slug. Any request body
/// is ignored; the browser client posts a display name the service never
/// stores.
pub async fn create_room_handler(State(state): State<AppState>) -> impl IntoResponse {
    let slug = nanoid::nanoid!();
    match state.store.create_room(&slug).await {
        Ok(_) => {
            tracing::info!(room = %slug, "room created");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "roomId": slug,
                    "message": "Room created successfully",
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to create room");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to create room" })),
            )
                .into_response()
        }
    }
}
