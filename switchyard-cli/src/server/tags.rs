use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use switchyard_lib::event::UNKNOWN_USER;
use switchyard_lib::model::Tag;

use super::error::ApiResult;
use super::extract::JsonBody;
use super::state::AppState;

pub async fn list_tags(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let tags = state.tags.list().await?;
    Ok(Json(json!({ "version": 1, "tags": tags })).into_response())
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    JsonBody(tag): JsonBody<Tag>,
) -> ApiResult<Response> {
    let tag = state.tags.create(tag, UNKNOWN_USER).await?;
    Ok((StatusCode::CREATED, Json(tag)).into_response())
}

pub async fn list_tags_by_type(
    State(state): State<Arc<AppState>>,
    Path(tag_type): Path<String>,
) -> ApiResult<Response> {
    let tags = state.tags.list_by_type(&tag_type).await?;
    Ok(Json(json!({ "version": 1, "tags": tags })).into_response())
}

pub async fn get_tag(
    State(state): State<Arc<AppState>>,
    Path((tag_type, value)): Path<(String, String)>,
) -> ApiResult<Response> {
    let tag = state.tags.get(&tag_type, &value).await?;
    Ok(Json(json!({ "version": 1, "tag": tag })).into_response())
}

pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Path((tag_type, value)): Path<(String, String)>,
) -> ApiResult<Response> {
    state
        .tags
        .delete(&Tag::new(tag_type, value), UNKNOWN_USER)
        .await?;
    Ok(StatusCode::OK.into_response())
}
