//! # API Route Modules
//!
//! - `channels`: index documents, wheel redirects, stub downloads, and
//!   channel deletion under `/channels`.
//! - `stubs`: stub upload and listing.
//! - `wheel_index`: upload of the wheel index document.

pub mod channels;
pub mod stubs;
pub mod wheel_index;

use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use chanrepo_core::RepoError;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::AppError;

/// `{"status": ...}` body returned by write endpoints.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    /// `success`, or the outcome of a deletion.
    pub status: &'static str,
}

impl StatusBody {
    /// Body for a completed upload.
    pub const SUCCESS: StatusBody = StatusBody { status: "success" };
}

/// Stream a stored file as the response body.
///
/// The file may vanish between lookup and open (concurrent channel
/// deletion); that is reported as not found.
pub(crate) async fn serve_file(path: &Path, content_type: &'static str) -> Result<Response, AppError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("file not found".into()));
        }
        Err(e) => return Err(RepoError::storage("opening", path)(e).into()),
    };
    let len = file
        .metadata()
        .await
        .map_err(RepoError::storage("inspecting", path))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}
