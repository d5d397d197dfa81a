use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use switchyard_lib::event::UNKNOWN_USER;
use switchyard_lib::model::{FeatureDefinition, FeatureQuery, FeatureToggle, Tag};
use switchyard_lib::service::StateDocument;
use switchyard_lib::ToggleAction;

use super::error::{ApiError, ApiResult};
use super::extract::JsonBody;
use super::metrics::record_toggle_update;
use super::state::AppState;

/// Builds a listing query from `tag`, `namePrefix` and `project`. `tag` and
/// `project` may repeat.
pub(crate) fn feature_query(params: &[(String, String)], allow_tags: bool) -> ApiResult<FeatureQuery> {
    let mut query = FeatureQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "namePrefix" => query.name_prefix = Some(value.clone()),
            "project" => query.projects.push(value.clone()),
            "tag" if allow_tags => match Tag::parse_filter(value) {
                Some(tag) => query.tags.push(tag),
                None => {
                    return Err(ApiError::BadRequest(format!(
                        "\"tag\" must be on the form type:value, got {value}"
                    )))
                }
            },
            _ => {}
        }
    }
    Ok(query)
}

fn features_body(features: Vec<FeatureToggle>) -> Json<serde_json::Value> {
    Json(json!({ "version": 1, "features": features }))
}

fn changed(toggle: FeatureToggle) -> Response {
    record_toggle_update(&toggle);
    (StatusCode::OK, Json(toggle)).into_response()
}

// ── Features ─────────────────────────────────────────────────

pub async fn list_features(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let query = feature_query(&params, true)?;
    let features = state.features.list(&query).await?;
    Ok(features_body(features).into_response())
}

pub async fn create_feature(
    State(state): State<Arc<AppState>>,
    JsonBody(definition): JsonBody<FeatureDefinition>,
) -> ApiResult<Response> {
    let toggle = state.features.create(definition, UNKNOWN_USER).await?;
    record_toggle_update(&toggle);
    Ok((StatusCode::CREATED, Json(toggle)).into_response())
}

pub async fn get_feature(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let toggle = state.features.get(&name).await?;
    Ok((StatusCode::OK, Json(toggle)).into_response())
}

pub async fn update_feature(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    JsonBody(definition): JsonBody<FeatureDefinition>,
) -> ApiResult<Response> {
    let toggle = state.features.update(&name, definition, UNKNOWN_USER).await?;
    Ok(changed(toggle))
}

pub async fn archive_feature(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let toggle = state.features.archive(&name, UNKNOWN_USER).await?;
    record_toggle_update(&toggle);
    Ok(StatusCode::OK.into_response())
}

async fn switch(state: &AppState, name: &str, action: ToggleAction) -> ApiResult<Response> {
    let toggle = state.features.toggle(name, action, UNKNOWN_USER).await?;
    Ok(changed(toggle))
}

pub async fn toggle_feature(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    switch(&state, &name, ToggleAction::Flip).await
}

pub async fn toggle_on(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    switch(&state, &name, ToggleAction::On).await
}

pub async fn toggle_off(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    switch(&state, &name, ToggleAction::Off).await
}

pub async fn stale_on(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let toggle = state.features.set_stale(&name, true, UNKNOWN_USER).await?;
    Ok(changed(toggle))
}

pub async fn stale_off(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let toggle = state.features.set_stale(&name, false, UNKNOWN_USER).await?;
    Ok(changed(toggle))
}

#[derive(Debug, Deserialize)]
pub struct NameBody {
    #[serde(default)]
    name: String,
}

/// 200 when the name could be used for a new toggle.
pub async fn validate_feature_name(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<NameBody>,
) -> ApiResult<Response> {
    state.features.validate_unique_name(&body.name).await?;
    Ok(StatusCode::OK.into_response())
}

// ── Feature tags ─────────────────────────────────────────────

pub async fn list_feature_tags(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let tags = state.features.tags_for(&name).await?;
    Ok(Json(json!({ "version": 1, "tags": tags })).into_response())
}

pub async fn add_feature_tag(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    JsonBody(tag): JsonBody<Tag>,
) -> ApiResult<Response> {
    let tag = state.features.tag_feature(&name, tag, UNKNOWN_USER).await?;
    Ok((StatusCode::CREATED, Json(tag)).into_response())
}

pub async fn remove_feature_tag(
    State(state): State<Arc<AppState>>,
    Path((name, tag_type, value)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let tag = Tag::new(tag_type, value);
    state.features.untag_feature(&name, &tag, UNKNOWN_USER).await?;
    Ok(StatusCode::OK.into_response())
}

// ── Archive ──────────────────────────────────────────────────

pub async fn list_archived(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let features = state.features.archived().await?;
    Ok(features_body(features).into_response())
}

pub async fn revive_feature(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let toggle = state.features.revive(&name, UNKNOWN_USER).await?;
    Ok(changed(toggle))
}

pub async fn delete_archived(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    state.features.delete_archived(&name, UNKNOWN_USER).await?;
    Ok(StatusCode::OK.into_response())
}

// ── State ────────────────────────────────────────────────────

pub async fn export_state(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let document = state.state.export().await?;
    Ok((StatusCode::OK, Json(document)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportParams {
    #[serde(default)]
    drop: bool,
}

pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportParams>,
    JsonBody(document): JsonBody<StateDocument>,
) -> ApiResult<Response> {
    let summary = state.state.import(document, params.drop, UNKNOWN_USER).await?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn query_collects_repeated_filters() {
        let query = feature_query(
            &params(&[
                ("tag", "simple:mytag"),
                ("tag", "team:core"),
                ("namePrefix", "a_"),
                ("project", "default"),
                ("ignored", "x"),
            ]),
            true,
        )
        .unwrap();
        assert_eq!(query.tags.len(), 2);
        assert_eq!(query.name_prefix.as_deref(), Some("a_"));
        assert_eq!(query.projects, vec!["default"]);
    }

    #[test]
    fn malformed_tag_is_rejected() {
        let err = feature_query(&params(&[("tag", "no-colon")]), true).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn client_queries_ignore_tags() {
        let query = feature_query(&params(&[("tag", "no-colon")]), false).unwrap();
        assert!(query.tags.is_empty());
    }
}
