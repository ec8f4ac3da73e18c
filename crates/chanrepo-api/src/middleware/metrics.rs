//! # Prometheus Metrics
//!
//! Request counters recorded through the `metrics` facade. The binary
//! installs a `metrics-exporter-prometheus` recorder and `/metrics` renders
//! it; without a recorder the counters are no-ops.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Counter of handled requests, labelled by method and status code.
pub const HTTP_REQUESTS_TOTAL: &str = "chanrepo_http_requests_total";

/// Middleware that counts every request once its response is ready.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();
    metrics::counter!(HTTP_REQUESTS_TOTAL, "method" => method, "status" => status).increment(1);
    response
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn render(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
