use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use switchyard_lib::error::{StoreError, StoreResult};
use switchyard_lib::event::{Event, NewEvent};
use switchyard_lib::model::{FeatureQuery, FeatureToggle, NameState, Tag};
use switchyard_lib::store::{EventStore, FeatureToggleStore, Stores, TagStore};
use tower::ServiceExt;

use super::config::StorageBackend;
use super::{build_router, AppState};

fn app() -> Router {
    build_router(Arc::new(AppState::new(
        Stores::memory(),
        StorageBackend::Memory,
    )))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn create(app: &Router, name: &str) -> (StatusCode, Value) {
    call(
        app,
        send_json(
            "POST",
            "/api/admin/features",
            json!({ "name": name, "strategies": [{ "name": "default" }] }),
        ),
    )
    .await
}

fn names(body: &Value) -> Vec<String> {
    body["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect()
}

fn first_message(body: &Value) -> &str {
    body["details"][0]["message"].as_str().unwrap()
}

#[tokio::test]
async fn health_is_good() {
    let (status, body) = call(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "health": "GOOD" }));
}

#[tokio::test]
async fn url_friendly_names_are_created() {
    let app = app();
    for name in ["com.example", "com.example-company", "another_toggle", "Tilde~and!bang"] {
        let (status, body) = create(&app, name).await;
        assert_eq!(status, StatusCode::CREATED, "{name}");
        assert_eq!(body["name"], name);
        assert_eq!(body["enabled"], false);
    }
    let (status, body) = call(&app, get("/api/admin/features/com.example")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"], "default");
}

#[tokio::test]
async fn unfriendly_names_are_rejected() {
    let app = app();
    for name in ["Ø-toggle", "ÆØÅ", "with space", "pipe|char"] {
        let (status, body) = create(&app, name).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name}");
        assert_eq!(first_message(&body), "\"name\" must be URL friendly");
    }
}

#[tokio::test]
async fn toggle_without_strategies_is_rejected() {
    let (status, body) = call(
        &app(),
        send_json(
            "POST",
            "/api/admin/features",
            json!({ "name": "no.strategy", "strategies": [] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(first_message(&body), "\"strategies\" must contain at least 1 items");
}

#[tokio::test]
async fn duplicate_names_conflict() {
    let app = app();
    create(&app, "taken").await;
    let (status, body) = create(&app, "taken").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(first_message(&body), "A toggle with name taken already exists");

    create(&app, "was.taken").await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/admin/features/was.taken")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, request).await.0, StatusCode::OK);
    let (status, body) = create(&app, "was.taken").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        first_message(&body),
        "An archived toggle with name was.taken already exists"
    );
}

#[tokio::test]
async fn duplicate_variant_names_are_rejected_on_update() {
    let app = app();
    create(&app, "with.variants").await;
    let (status, _) = call(
        &app,
        send_json(
            "PUT",
            "/api/admin/features/with.variants",
            json!({
                "strategies": [{ "name": "default" }],
                "variants": [{ "name": "red" }, { "name": "red" }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn body_must_be_json() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/features")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("name=plain"))
        .unwrap();
    let (status, _) = call(&app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/features")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"][0]["message"].is_string());
}

#[tokio::test]
async fn list_filters_by_prefix_and_tag() {
    let app = app();
    for name in ["a_team.toggle", "a_tag.toggle", "b_tag.toggle"] {
        create(&app, name).await;
    }
    let (status, _) = call(
        &app,
        send_json(
            "POST",
            "/api/admin/features/b_tag.toggle/tags",
            json!({ "type": "simple", "value": "mytag" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, get("/api/admin/features?namePrefix=a_")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert_eq!(names(&body), vec!["a_team.toggle", "a_tag.toggle"]);

    let (_, body) = call(&app, get("/api/admin/features?tag=simple:mytag")).await;
    assert_eq!(names(&body), vec!["b_tag.toggle"]);

    let (status, _) = call(&app, get("/api/admin/features?tag=simple")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn toggle_endpoints_echo_state() {
    let app = app();
    create(&app, "flip.me").await;

    let (_, body) = call(&app, post("/api/admin/features/flip.me/toggle")).await;
    assert_eq!(body["enabled"], true);
    let (_, body) = call(&app, post("/api/admin/features/flip.me/toggle/off")).await;
    assert_eq!(body["enabled"], false);
    let (_, body) = call(&app, post("/api/admin/features/flip.me/toggle/on")).await;
    assert_eq!(body["enabled"], true);
    let (_, body) = call(&app, post("/api/admin/features/flip.me/stale/on")).await;
    assert_eq!(body["stale"], true);
    let (_, body) = call(&app, post("/api/admin/features/flip.me/stale/off")).await;
    assert_eq!(body["stale"], false);

    let (status, body) = call(&app, post("/api/admin/features/missing/toggle")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(first_message(&body), "Could not find feature with name missing");
}

#[tokio::test]
async fn archive_lifecycle() {
    let app = app();
    create(&app, "short.lived").await;
    call(
        &app,
        send_json(
            "POST",
            "/api/admin/features/short.lived/tags",
            json!({ "type": "simple", "value": "mytag" }),
        ),
    )
    .await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/admin/features/short.lived")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, request).await.0, StatusCode::OK);

    let (_, body) = call(&app, get("/api/client/features")).await;
    assert!(names(&body).is_empty());
    let (_, body) = call(&app, get("/api/admin/archive/features")).await;
    assert_eq!(names(&body), vec!["short.lived"]);

    let (_, body) = call(&app, get("/api/admin/events/short.lived")).await;
    let archived: Vec<&Value> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["type"] == "feature-archived")
        .collect();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0]["tags"], json!([{ "type": "simple", "value": "mytag" }]));
    assert_eq!(archived[0]["createdBy"], "unknown");

    let (status, body) = call(&app, post("/api/admin/archive/revive/short.lived")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    let (status, _) = call(&app, get("/api/client/features/short.lived")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delete_archived_frees_the_name() {
    let app = app();
    create(&app, "gone.for.good").await;
    let archive = Request::builder()
        .method("DELETE")
        .uri("/api/admin/features/gone.for.good")
        .body(Body::empty())
        .unwrap();
    call(&app, archive).await;
    let purge = Request::builder()
        .method("DELETE")
        .uri("/api/admin/archive/gone.for.good")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, purge).await.0, StatusCode::OK);

    let (status, _) = call(
        &app,
        send_json(
            "POST",
            "/api/admin/features/validate",
            json!({ "name": "gone.for.good" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn validate_endpoint() {
    let app = app();
    create(&app, "existing").await;
    let validate = |name: &str| {
        send_json("POST", "/api/admin/features/validate", json!({ "name": name }))
    };
    assert_eq!(call(&app, validate("fresh")).await.0, StatusCode::OK);
    assert_eq!(call(&app, validate("existing")).await.0, StatusCode::CONFLICT);
    assert_eq!(call(&app, validate("not ok")).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn route_names_are_reserved() {
    let app = app();
    let (status, body) = create(&app, "validate").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(first_message(&body), "\"name\" validate is reserved");
    let (status, _) = call(
        &app,
        send_json("POST", "/api/admin/features/validate", json!({ "name": "validate" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn untagging_a_missing_toggle_is_not_found() {
    let app = app();
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/admin/features/no.such.toggle/tags/simple/mytag")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, request).await.0, StatusCode::NOT_FOUND);
    let (_, body) = call(&app, get("/api/admin/events")).await;
    assert!(body["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn sled_backed_router_persists_toggles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();
    {
        let app = build_router(Arc::new(AppState::new(
            Stores::sled(&path).unwrap(),
            StorageBackend::Sled,
        )));
        let (status, _) = create(&app, "sled.toggle").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(
            &app,
            send_json(
                "POST",
                "/api/admin/features/sled.toggle/tags",
                json!({ "type": "simple", "value": "kept" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let app = build_router(Arc::new(AppState::new(
        Stores::sled(&path).unwrap(),
        StorageBackend::Sled,
    )));
    let (status, body) = call(&app, get("/api/admin/features/sled.toggle")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "sled.toggle");
    let (_, body) = call(&app, get("/api/admin/features/sled.toggle/tags")).await;
    assert_eq!(body["tags"], json!([{ "type": "simple", "value": "kept" }]));
}

#[tokio::test]
async fn client_features_honour_etag() {
    let app = app();
    create(&app, "cached").await;
    call(&app, post("/api/admin/features/cached/toggle/on")).await;

    let response = app
        .clone()
        .oneshot(get("/api/client/features"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["version"], 1);
    assert_eq!(body["features"][0]["enabled"], true);

    let request = Request::builder()
        .uri("/api/client/features")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    // any change produces a new tag
    call(&app, post("/api/admin/features/cached/toggle/off")).await;
    let request = Request::builder()
        .uri("/api/client/features")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tag_endpoints() {
    let app = app();
    let (status, body) = call(
        &app,
        send_json("POST", "/api/admin/tags", json!({ "type": "team", "value": "core" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "type": "team", "value": "core" }));

    let (status, _) = call(
        &app,
        send_json("POST", "/api/admin/tags", json!({ "type": "team", "value": "core" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&app, get("/api/admin/tags/team")).await;
    assert_eq!(body["tags"].as_array().unwrap().len(), 1);
    let (status, body) = call(&app, get("/api/admin/tags/team/core")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag"]["value"], "core");

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/admin/tags/team/core")
        .body(Body::empty())
        .unwrap();
    assert_eq!(call(&app, request).await.0, StatusCode::OK);
    let (status, _) = call(&app, get("/api/admin/tags/team/core")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn state_export_and_import() {
    let source = app();
    create(&source, "exported.toggle").await;
    call(
        &source,
        send_json(
            "POST",
            "/api/admin/features/exported.toggle/tags",
            json!({ "type": "simple", "value": "carried" }),
        ),
    )
    .await;
    let (status, document) = call(&source, get("/api/admin/state/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(document["version"], 1);

    let target = app();
    create(&target, "doomed").await;
    let (status, summary) = call(
        &target,
        send_json("POST", "/api/admin/state/import?drop=true", document),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["features"], 1);
    assert_eq!(summary["featureTags"], 1);

    let (_, body) = call(&target, get("/api/admin/features")).await;
    assert_eq!(names(&body), vec!["exported.toggle"]);
    let (_, body) = call(&target, get("/api/admin/features/exported.toggle/tags")).await;
    assert_eq!(body["tags"], json!([{ "type": "simple", "value": "carried" }]));
}

#[tokio::test]
async fn metrics_are_exposed() {
    let app = app();
    call(&app, get("/health")).await;
    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("switchyard_http_requests_total"));
}

/// A backend whose database is gone.
struct Unavailable;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Backend("connection refused".into()))
}

#[async_trait]
impl TagStore for Unavailable {
    async fn get_all(&self) -> StoreResult<Vec<Tag>> {
        down()
    }
    async fn get_tags_by_type(&self, _: &str) -> StoreResult<Vec<Tag>> {
        down()
    }
    async fn get_tag(&self, _: &str, _: &str) -> StoreResult<Tag> {
        down()
    }
    async fn exists(&self, _: &Tag) -> StoreResult<bool> {
        down()
    }
    async fn create_tag(&self, _: &Tag) -> StoreResult<()> {
        down()
    }
    async fn delete_tag(&self, _: &Tag) -> StoreResult<bool> {
        down()
    }
    async fn bulk_import(&self, _: &[Tag]) -> StoreResult<Vec<Tag>> {
        down()
    }
    async fn drop_tags(&self) -> StoreResult<()> {
        down()
    }
}

#[async_trait]
impl FeatureToggleStore for Unavailable {
    async fn get_features(&self, _: &FeatureQuery) -> StoreResult<Vec<FeatureToggle>> {
        down()
    }
    async fn get_feature(&self, _: &str) -> StoreResult<FeatureToggle> {
        down()
    }
    async fn has_feature(&self, _: &str) -> StoreResult<Option<NameState>> {
        down()
    }
    async fn create_feature(&self, _: &FeatureToggle) -> StoreResult<()> {
        down()
    }
    async fn update_feature(&self, _: &FeatureToggle) -> StoreResult<()> {
        down()
    }
    async fn get_archived_features(&self) -> StoreResult<Vec<FeatureToggle>> {
        down()
    }
    async fn archive_feature(&self, _: &str) -> StoreResult<FeatureToggle> {
        down()
    }
    async fn revive_feature(&self, _: &str) -> StoreResult<FeatureToggle> {
        down()
    }
    async fn delete_feature(&self, _: &str) -> StoreResult<()> {
        down()
    }
    async fn add_archived_feature(&self, _: &FeatureToggle) -> StoreResult<()> {
        down()
    }
    async fn tag_feature(&self, _: &str, _: &Tag) -> StoreResult<()> {
        down()
    }
    async fn untag_feature(&self, _: &str, _: &Tag) -> StoreResult<()> {
        down()
    }
    async fn get_tags_for_feature(&self, _: &str) -> StoreResult<Vec<Tag>> {
        down()
    }
    async fn get_all_feature_tags(&self) -> StoreResult<Vec<(String, Tag)>> {
        down()
    }
    async fn drop_features(&self) -> StoreResult<()> {
        down()
    }
}

#[async_trait]
impl EventStore for Unavailable {
    async fn append(&self, _: NewEvent) -> StoreResult<Event> {
        down()
    }
    async fn get_events(&self) -> StoreResult<Vec<Event>> {
        down()
    }
    async fn get_events_for_toggle(&self, _: &str) -> StoreResult<Vec<Event>> {
        down()
    }
}

#[tokio::test]
async fn unavailable_store_is_a_server_error() {
    let app = build_router(Arc::new(AppState::new(
        Stores::from_backend(Arc::new(Unavailable)),
        StorageBackend::Sled,
    )));

    let (status, body) = call(&app, get("/api/admin/features")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!first_message(&body).contains("connection refused"));

    let (status, body) = call(&app, get("/health")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "health": "BAD" }));
}
