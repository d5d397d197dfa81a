use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use sha1::{Digest, Sha1};
use switchyard_lib::StoreError;
use switchyard_lib::ToggleError;

use super::admin::feature_query;
use super::error::ApiResult;
use super::state::AppState;

fn etag_for(body: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(body);
    format!("\"{:x}\"", hasher.finalize())
}

/// Serializes `value` and answers 304 when the caller already holds this exact
/// body.
fn cached_json<T: Serialize>(headers: &HeaderMap, value: &T) -> ApiResult<Response> {
    let body = serde_json::to_vec(value).map_err(|e| ToggleError::from(StoreError::from(e)))?;
    let etag = etag_for(&body);

    let fresh = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|candidate| candidate.trim() == etag))
        .unwrap_or(false);
    if fresh {
        return Ok((StatusCode::NOT_MODIFIED, [(ETAG, etag)]).into_response());
    }

    Ok((
        StatusCode::OK,
        [(ETAG, etag), (axum::http::header::CONTENT_TYPE, "application/json".to_string())],
        body,
    )
        .into_response())
}

/// Live toggles for SDKs. Archived toggles never show up here.
pub async fn client_features(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let query = feature_query(&params, false)?;
    let features = state.features.list(&query).await?;
    cached_json(&headers, &json!({ "version": 1, "features": features }))
}

pub async fn client_feature(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let toggle = state.features.get(&name).await?;
    cached_json(&headers, &toggle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_quoted_sha1() {
        let etag = etag_for(b"{}");
        assert_eq!(etag, "\"bf21a9e8fbc5a3846fb05b4fa0859e0917b2202f\"");
    }

    #[test]
    fn matching_etag_short_circuits() {
        let value = json!({ "version": 1, "features": [] });
        let body = serde_json::to_vec(&value).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(IF_NONE_MATCH, etag_for(&body).parse().unwrap());
        let response = cached_json(&headers, &value).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let response = cached_json(&HeaderMap::new(), &value).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(ETAG));
    }
}
