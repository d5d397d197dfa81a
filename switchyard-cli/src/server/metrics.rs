use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use switchyard_lib::FeatureToggle;
use tracing::error;

use super::config::StorageBackend;

/// Global metrics registry
static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub struct Metrics {
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
    pub toggle_updates: IntCounterVec,
    pub storage_backend: IntGaugeVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new(registry: &Registry) -> Self {
        let http_requests_total = IntCounterVec::new(
            Opts::new("switchyard_http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("failed to create http_requests_total metric");

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["method", "path"],
        )
        .expect("failed to create http_request_duration metric");

        let toggle_updates = IntCounterVec::new(
            Opts::new(
                "switchyard_feature_toggle_updates_total",
                "Number of changes made to each feature toggle",
            ),
            &["toggle", "project"],
        )
        .expect("failed to create toggle_updates metric");

        let storage_backend = IntGaugeVec::new(
            Opts::new("switchyard_storage_backend", "Storage backend type (1=active)"),
            &["type"],
        )
        .expect("failed to create storage_backend metric");

        registry.register(Box::new(http_requests_total.clone())).expect("register http_requests_total");
        registry.register(Box::new(http_request_duration.clone())).expect("register http_request_duration");
        registry.register(Box::new(toggle_updates.clone())).expect("register toggle_updates");
        registry.register(Box::new(storage_backend.clone())).expect("register storage_backend");

        Self {
            http_requests_total,
            http_request_duration,
            toggle_updates,
            storage_backend,
        }
    }
}

/// Get the global metrics instance, initializing on first call
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = REGISTRY.get_or_init(Registry::new);
        Metrics::new(registry)
    })
}

pub fn record_toggle_update(toggle: &FeatureToggle) {
    metrics()
        .toggle_updates
        .with_label_values(&[&toggle.name, &toggle.project])
        .inc();
}

pub fn record_storage_backend(storage: StorageBackend) {
    metrics()
        .storage_backend
        .with_label_values(&[storage.as_str()])
        .set(1);
}

/// Axum handler for GET /metrics, returns Prometheus text format
pub async fn handle_metrics() -> Response {
    let _ = metrics();
    let registry = REGISTRY.get_or_init(Registry::new);
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Axum middleware that records HTTP request count and duration.
pub async fn track_metrics(request: Request<axum::body::Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let m = metrics();
    m.http_requests_total
        .with_label_values(&[&method, &path, &status])
        .inc();
    m.http_request_duration
        .with_label_values(&[&method, &path])
        .observe(elapsed);

    response
}
