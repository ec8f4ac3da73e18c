//! # Stub Routes
//!
//! `POST /stubs` stores a stub package and answers with its short hash;
//! `GET /stubs` lists every stored hash.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::routing::get;
use axum::{Json, Router};
use chanrepo_core::ShortHash;
use serde::Serialize;

use crate::auth::RepoAdmin;
use crate::error::AppError;
use crate::extractors::{multipart_body, stream_file_field};
use crate::state::AppState;

/// Response to a stub upload.
#[derive(Debug, Serialize)]
pub struct StubCreated {
    /// Short content hash the stub is now addressable by.
    pub hash: ShortHash,
}

/// Response to a stub listing.
#[derive(Debug, Serialize)]
pub struct StubList {
    /// Hashes of all stored stubs, in ascending order.
    pub stubs: Vec<ShortHash>,
}

/// `/stubs` routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/stubs", get(list_stubs).post(add_stub))
}

async fn add_stub(
    _admin: RepoAdmin,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StubCreated>, AppError> {
    let mut multipart = multipart_body(multipart)?;
    let upload = stream_file_field(&mut multipart, || state.repo.stubs().begin()).await?;
    let hash = upload.finish().await?;
    Ok(Json(StubCreated { hash }))
}

async fn list_stubs(State(state): State<AppState>) -> Result<Json<StubList>, AppError> {
    let stubs = state.repo.stubs().list().await?.into_iter().collect();
    Ok(Json(StubList { stubs }))
}
