//! # Channel Routes
//!
//! Everything under `/channels/{channel}`:
//!
//! | Method | Tail                                   | Handler |
//! |--------|----------------------------------------|---------|
//! | GET    | `[{sub}/]{arch}/repodata.json`         | stream the index document |
//! | GET    | `[{sub}/]{arch}/{name}.whl`            | 307 redirect |
//! | GET    | `[{sub}/]{arch}/_c…_{hash}.tar.bz2`    | stream the stub package |
//! | POST   | `[{sub}/]{arch}/repodata.json`         | replace the index document |
//! | DELETE | (none) or `{sub}`                      | delete the channel tree |
//!
//! The read routes are also mounted under `/private` and `/cached`; the
//! mounting point decides the wheel [`ResolutionMode`].

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get};
use axum::{Extension, Json, Router};
use chanrepo_core::stub::hash_from_filename;
use chanrepo_core::wheel::WHEEL_EXTENSION;
use chanrepo_core::{ChannelName, ResolutionMode, WheelContext};

use super::{serve_file, StatusBody};
use crate::auth::RepoAdmin;
use crate::error::AppError;
use crate::extractors::{multipart_body, stream_file_field, ArtifactPath};
use crate::state::AppState;

/// Filename under which index documents are served and uploaded.
pub const INDEX_FILENAME: &str = "repodata.json";

const INDEX_CONTENT_TYPE: &str = "application/json";
const STUB_CONTENT_TYPE: &str = "application/x-bzip2";

/// Read and write routes, mounted at the root.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels/{channel}", delete(delete_channel))
        .route(
            "/channels/{channel}/{*path}",
            get(get_artifact).post(upload_index).delete(delete_subchannel),
        )
}

/// Read-only routes, mounted under the `/private` and `/cached` prefixes.
pub fn read_router() -> Router<AppState> {
    Router::new().route("/channels/{channel}/{*path}", get(get_artifact))
}

/// GET an index document, wheel redirect, or stub package.
async fn get_artifact(
    State(state): State<AppState>,
    Extension(mode): Extension<ResolutionMode>,
    path: ArtifactPath,
) -> Result<Response, AppError> {
    if path.filename == INDEX_FILENAME {
        let location = path.index_location();
        let file = state.repo.indexes().locate(&location).await?;
        tracing::debug!(%location, "serving index document");
        return serve_file(&file, INDEX_CONTENT_TYPE).await;
    }

    if path.filename.ends_with(WHEEL_EXTENSION) {
        let context = WheelContext {
            channel: &path.channel,
            subchannel: path.subchannel.as_ref(),
        };
        let url = state.repo.wheels().resolve(mode, context, &path.filename).await?;
        return Ok(Redirect::temporary(&url).into_response());
    }

    match hash_from_filename(&path.filename)? {
        Some(hash) => {
            let file = state.repo.stubs().locate(&hash).await?;
            serve_file(&file, STUB_CONTENT_TYPE).await
        }
        None => Err(AppError::NotFound(format!("invalid filename {}", path.filename))),
    }
}

/// POST a new index document as multipart field `file`.
async fn upload_index(
    _admin: RepoAdmin,
    State(state): State<AppState>,
    path: ArtifactPath,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StatusBody>, AppError> {
    if path.filename != INDEX_FILENAME {
        return Err(AppError::NotFound(format!(
            "uploads are only accepted for {INDEX_FILENAME}"
        )));
    }
    let mut multipart = multipart_body(multipart)?;
    let location = path.index_location();
    let upload =
        stream_file_field(&mut multipart, || state.repo.indexes().begin_upload(location)).await?;
    upload.finish().await?;
    Ok(Json(StatusBody::SUCCESS))
}

/// DELETE a whole channel.
async fn delete_channel(
    _admin: RepoAdmin,
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<StatusBody>, AppError> {
    let channel = ChannelName::parse(&channel)?;
    let removal = state.repo.indexes().delete_channel(&channel, None).await?;
    Ok(Json(StatusBody {
        status: removal.as_str(),
    }))
}

/// DELETE one subchannel, leaving the parent channel in place.
async fn delete_subchannel(
    _admin: RepoAdmin,
    State(state): State<AppState>,
    Path((channel, tail)): Path<(String, String)>,
) -> Result<Json<StatusBody>, AppError> {
    if tail.is_empty() || tail.contains('/') {
        return Err(AppError::NotFound(format!("no route for /channels/{channel}/{tail}")));
    }
    let channel = ChannelName::parse(&channel)?;
    let subchannel = ChannelName::parse_subchannel(&tail)?;
    let removal = state
        .repo
        .indexes()
        .delete_channel(&channel, Some(&subchannel))
        .await?;
    Ok(Json(StatusBody {
        status: removal.as_str(),
    }))
}
