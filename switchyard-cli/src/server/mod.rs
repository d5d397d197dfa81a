mod admin;
mod client;
pub mod config;
mod error;
mod events;
mod extract;
mod metrics;
mod state;
mod tags;

#[cfg(test)]
mod tests;

use std::process;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use switchyard_lib::error::StoreResult;
use switchyard_lib::store::Stores;
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

use self::config::{ServerConfig, ServerOverrides, StorageBackend, SwitchyardConfig};
use self::metrics::{handle_metrics, record_storage_backend, track_metrics};
pub use self::state::AppState;

/// Opens the configured backend. Sled keeps its files under `data_dir`.
pub fn open_stores(config: &ServerConfig) -> StoreResult<Stores> {
    match config.storage {
        StorageBackend::Sled => Stores::sled(&config.data_dir),
        StorageBackend::Memory => Ok(Stores::memory()),
    }
}

/// GET /health, answers BAD when the store does not respond.
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    // any round trip proves the store answers
    match state.stores.features.has_feature("").await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "health": "GOOD" }))).into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "health": "BAD" })),
            )
                .into_response()
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/features",
            get(admin::list_features).post(admin::create_feature),
        )
        .route("/features/validate", post(admin::validate_feature_name))
        .route(
            "/features/{name}",
            get(admin::get_feature)
                .put(admin::update_feature)
                .delete(admin::archive_feature),
        )
        .route("/features/{name}/toggle", post(admin::toggle_feature))
        .route("/features/{name}/toggle/on", post(admin::toggle_on))
        .route("/features/{name}/toggle/off", post(admin::toggle_off))
        .route("/features/{name}/stale/on", post(admin::stale_on))
        .route("/features/{name}/stale/off", post(admin::stale_off))
        .route(
            "/features/{name}/tags",
            get(admin::list_feature_tags).post(admin::add_feature_tag),
        )
        .route(
            "/features/{name}/tags/{type}/{value}",
            delete(admin::remove_feature_tag),
        )
        .route("/archive/features", get(admin::list_archived))
        .route("/archive/revive/{name}", post(admin::revive_feature))
        .route("/archive/{name}", delete(admin::delete_archived))
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/tags/{type}", get(tags::list_tags_by_type))
        .route(
            "/tags/{type}/{value}",
            get(tags::get_tag).delete(tags::delete_tag),
        )
        .route("/events", get(events::list_events))
        .route("/events/{name}", get(events::toggle_events))
        .route("/state/export", get(admin::export_state))
        .route("/state/import", post(admin::import_state));

    let client = Router::new()
        .route("/features", get(client::client_features))
        .route("/features/{name}", get(client::client_feature));

    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .nest("/api/admin", admin)
        .nest("/api/client", client)
        .route_layer(middleware::from_fn(track_metrics))
        .layer(CompressionLayer::new())
        .with_state(state)
}

pub async fn run_serve(config_path: &str, overrides: ServerOverrides) {
    let config = SwitchyardConfig::resolve(config_path, overrides).server;

    let stores = match open_stores(&config) {
        Ok(stores) => stores,
        Err(e) => {
            error!(error = %e, data_dir = %config.data_dir, "failed to open storage");
            process::exit(1);
        }
    };
    record_storage_backend(config.storage);

    let state = Arc::new(AppState::new(stores, config.storage));
    let app = build_router(state);

    let addr = format!("{}:{}", config.hostname, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            process::exit(1);
        }
    };
    info!(%addr, storage = %config.storage, "switchyard listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        process::exit(1);
    }

    info!("server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, finishing in-flight requests");
}
