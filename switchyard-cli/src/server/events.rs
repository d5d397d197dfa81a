use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use switchyard_lib::ToggleError;

use super::error::ApiResult;
use super::state::AppState;

/// Newest first.
pub async fn list_events(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let events = state
        .stores
        .events
        .get_events()
        .await
        .map_err(ToggleError::from)?;
    Ok(Json(json!({ "version": 1, "events": events })).into_response())
}

pub async fn toggle_events(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let events = state
        .stores
        .events
        .get_events_for_toggle(&name)
        .await
        .map_err(ToggleError::from)?;
    Ok(Json(json!({ "version": 1, "toggleName": name, "events": events })).into_response())
}
