//! Track snapshot, save and artwork endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use tune_common::events::EventItem;

use crate::error::{ApiError, ApiResult};
use crate::services::identity::TrackId;
use crate::services::pipeline::SaveOptions;
use crate::services::registry::SnapshotView;
use crate::AppState;

/// POST /tracks/save request body
#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    /// Edited tracks, each `{id, ...fields}`
    pub tracks: Vec<EventItem>,
    #[serde(default)]
    pub options: SaveOptions,
}

/// POST /tracks/save response
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub queued: usize,
}

/// POST /tracks/save
///
/// Every id must name a tracked record; nothing is queued otherwise.
pub async fn save_tracks(
    State(state): State<AppState>,
    Json(request): Json<SaveRequest>,
) -> ApiResult<(StatusCode, Json<SaveResponse>)> {
    for edit in &request.tracks {
        let id = edit
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::BadRequest("Track without an id".to_string()))?;
        if !state.registry.contains(&TrackId::from_string(id)) {
            return Err(ApiError::NotFound(format!("Track {}", id)));
        }
    }

    let queued = request.tracks.len();
    info!(tracks = queued, "Save requested");
    state.processor.save_all(request.tracks, request.options);

    Ok((StatusCode::ACCEPTED, Json(SaveResponse { queued })))
}

/// GET /tracks
pub async fn list_tracks(State(state): State<AppState>) -> Json<SnapshotView> {
    Json(state.registry.snapshot().view(state.registry.import_root()))
}

/// GET /artwork/:key
pub async fn get_artwork(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let artwork = state
        .registry
        .cached_artwork(&key)
        .ok_or_else(|| ApiError::NotFound(format!("Artwork {}", key)))?;

    Ok(([(header::CONTENT_TYPE, artwork.mime)], artwork.data.to_vec()))
}

/// Build track routes
pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route("/tracks", get(list_tracks))
        .route("/tracks/save", post(save_tracks))
        .route("/artwork/:key", get(get_artwork))
}
