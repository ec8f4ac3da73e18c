//! # Wheel Index Upload
//!
//! `POST /wheel_cache` replaces the `{key: url}` document consulted by
//! `/cached/channels/...` wheel requests and drops the in-memory copy. The
//! document is parsed lazily on the next lookup, not here.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};

use super::StatusBody;
use crate::auth::RepoAdmin;
use crate::error::AppError;
use crate::extractors::{multipart_body, stream_file_field};
use crate::state::AppState;

/// `/wheel_cache` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/wheel_cache", post(upload_wheel_index))
}

async fn upload_wheel_index(
    _admin: RepoAdmin,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StatusBody>, AppError> {
    let mut multipart = multipart_body(multipart)?;
    let writer = stream_file_field(&mut multipart, || state.repo.begin_wheel_index_upload()).await?;
    state.repo.commit_wheel_index(writer).await?;
    Ok(Json(StatusBody::SUCCESS))
}
