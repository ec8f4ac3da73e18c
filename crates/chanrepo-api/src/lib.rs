//! # chanrepo-api: HTTP Service for Package Channels
//!
//! Serves per-channel, per-architecture index documents and stub packages
//! from the storage layer in `chanrepo-core`, redirects wheel requests, and
//! accepts authenticated uploads and channel deletions.
//!
//! ## API Surface
//!
//! | Prefix                  | Module                     | Purpose |
//! |-------------------------|----------------------------|---------|
//! | `/channels/*`           | [`routes::channels`]       | Index, stub, wheel (public mode), uploads, deletion |
//! | `/private/channels/*`   | [`routes::channels`]       | Reads; wheels resolved on the private mirror |
//! | `/cached/channels/*`    | [`routes::channels`]       | Reads; wheels resolved through the wheel index |
//! | `/stubs`                | [`routes::stubs`]          | Stub upload and listing |
//! | `/wheel_cache`          | [`routes::wheel_index`]    | Wheel index upload |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → DefaultBodyLimit → Handler (RepoAdmin on writes)
//! ```

pub mod auth;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chanrepo_core::ResolutionMode;
use tower_http::trace::TraceLayer;

use crate::routes::StatusBody;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let body_limit = match state.config.max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let api = Router::new()
        .merge(routes::channels::router().layer(Extension(ResolutionMode::Public)))
        .nest(
            "/private",
            routes::channels::read_router().layer(Extension(ResolutionMode::PrivateMirror)),
        )
        .nest(
            "/cached",
            routes::channels::read_router().layer(Extension(ResolutionMode::IndexCache)),
        )
        .merge(routes::stubs::router())
        .merge(routes::wheel_index::router())
        .layer(body_limit)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http());

    let ops = Router::new()
        .route("/", get(root))
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(middleware::metrics::render));

    Router::new().merge(ops).merge(api).with_state(state)
}

async fn root() -> Json<StatusBody> {
    Json(StatusBody { status: "ok" })
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the storage root can be reached.
async fn readiness(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<&'static str, error::AppError> {
    let root = state.repo.layout().root();
    tokio::fs::create_dir_all(root)
        .await
        .map_err(chanrepo_core::RepoError::storage("creating", root))?;
    Ok("ready")
}
