//! # Custom Extractors
//!
//! Path parsing for channel artifact URLs and streaming of multipart
//! uploads into the core's upload writers.

use std::future::Future;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{FromRequestParts, Multipart, Path};
use axum::http::request::Parts;
use chanrepo_core::{
    Arch, AtomicWriter, ChannelName, IndexLocation, IndexUpload, RepoError, StubUpload,
};

use crate::error::AppError;

/// Name of the multipart form field carrying the uploaded file.
pub const FILE_FIELD: &str = "file";

/// A validated `/channels/{channel}/[{subchannel}/]{arch}/{filename}` path.
///
/// The route captures everything after the channel as one wildcard so that
/// two- and three-segment tails share a single route.
#[derive(Debug, Clone)]
pub struct ArtifactPath {
    pub channel: ChannelName,
    /// Never named after an arch.
    pub subchannel: Option<ChannelName>,
    pub arch: Arch,
    /// Last segment, unvalidated; the handler decides what it names.
    pub filename: String,
}

impl ArtifactPath {
    /// Parse the channel segment and the wildcard tail.
    pub fn parse(channel: &str, tail: &str) -> Result<Self, AppError> {
        let segments: Vec<&str> = tail.split('/').collect();
        let (subchannel, arch, filename) = match segments.as_slice() {
            [arch, filename] => (None, *arch, *filename),
            [sub, arch, filename] => (Some(*sub), *arch, *filename),
            _ => return Err(AppError::NotFound(format!("no route for /channels/{channel}/{tail}"))),
        };
        if filename.is_empty() {
            return Err(AppError::NotFound(format!("no route for /channels/{channel}/{tail}")));
        }
        Ok(Self {
            channel: ChannelName::parse(channel)?,
            subchannel: subchannel.map(ChannelName::parse_subchannel).transpose()?,
            arch: Arch::parse(arch)?,
            filename: filename.to_string(),
        })
    }

    /// Where this path's index document lives.
    pub fn index_location(&self) -> IndexLocation {
        IndexLocation::new(self.channel.clone(), self.arch).with_subchannel(self.subchannel.clone())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ArtifactPath {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((channel, tail)) = Path::<(String, String)>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Self::parse(&channel, &tail)
    }
}

/// Map a multipart extraction failure to [`AppError::BadRequest`].
pub fn multipart_body(result: Result<Multipart, MultipartRejection>) -> Result<Multipart, AppError> {
    result.map_err(|err| AppError::BadRequest(err.body_text()))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}

/// Destination for streamed upload chunks.
///
/// Implemented by the core's staged writers so one multipart loop can feed
/// any of them.
pub trait ChunkSink: Send {
    /// Append `chunk` to the staged upload.
    fn write_chunk(&mut self, chunk: &[u8]) -> impl Future<Output = Result<(), RepoError>> + Send;
}

impl ChunkSink for AtomicWriter {
    fn write_chunk(&mut self, chunk: &[u8]) -> impl Future<Output = Result<(), RepoError>> + Send {
        AtomicWriter::write_chunk(self, chunk)
    }
}

impl ChunkSink for IndexUpload {
    fn write_chunk(&mut self, chunk: &[u8]) -> impl Future<Output = Result<(), RepoError>> + Send {
        IndexUpload::write_chunk(self, chunk)
    }
}

impl ChunkSink for StubUpload {
    fn write_chunk(&mut self, chunk: &[u8]) -> impl Future<Output = Result<(), RepoError>> + Send {
        StubUpload::write_chunk(self, chunk)
    }
}

/// Stream the `file` field of a multipart body into a sink opened by `begin`.
///
/// Other fields are skipped. `begin` runs only once the `file` field has
/// been found, so a body without one is rejected as a bad request before
/// any directory or staging file is created.
pub async fn stream_file_field<S, F, Fut>(multipart: &mut Multipart, begin: F) -> Result<S, AppError>
where
    S: ChunkSink,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S, RepoError>>,
{
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let mut sink = begin().await?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            sink.write_chunk(&chunk).await?;
        }
        return Ok(sink);
    }
    Err(AppError::BadRequest(format!(
        "multipart field \"{FILE_FIELD}\" is required"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_top_level_and_subchannel_paths() {
        let top = ArtifactPath::parse("mychan", "linux-64/repodata.json").unwrap();
        assert_eq!(top.channel.as_str(), "mychan");
        assert!(top.subchannel.is_none());
        assert_eq!(top.arch, Arch::Linux64);
        assert_eq!(top.filename, "repodata.json");

        let nested = ArtifactPath::parse("mychan", "sub/noarch/pkg-1.0-py3-none-any.whl").unwrap();
        assert_eq!(nested.subchannel.unwrap().as_str(), "sub");
        assert_eq!(nested.arch, Arch::Noarch);
    }

    #[test]
    fn rejects_bad_identifiers_as_bad_request() {
        for (channel, tail) in [
            ("Bad", "noarch/repodata.json"),
            ("..", "noarch/repodata.json"),
            ("wheel_cache", "noarch/repodata.json"),
            ("ok", "amd64/repodata.json"),
            ("ok", "Sub/noarch/repodata.json"),
            ("ok", "noarch/linux-64/repodata.json"),
        ] {
            let err = ArtifactPath::parse(channel, tail).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{channel}/{tail}: {err:?}");
        }
    }

    #[test]
    fn wrong_segment_count_is_not_found() {
        for tail in ["repodata.json", "a/b/c/d", "noarch/"] {
            let err = ArtifactPath::parse("ok", tail).unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)), "{tail}: {err:?}");
        }
    }
}
