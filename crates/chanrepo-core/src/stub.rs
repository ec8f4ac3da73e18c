//! # Stub Content Store
//!
//! Content-addressed storage for stub packages. A stub is stored as
//! `<root>/stubs/<hash8>.tar.bz2`, where `hash8` is the first 8 hex
//! characters of the SHA-256 of its bytes.
//!
//! Uploads are staged in the stub directory itself and renamed into place
//! once the hash is known. Uploading identical bytes twice renames
//! byte-identical content over the existing file, so the store never holds
//! more than one file per hash.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tokio::io::AsyncRead;

use crate::atomic::{is_staging_file, AtomicWriter};
use crate::error::RepoError;
use crate::identifier::ShortHash;
use crate::layout::{StorageLayout, STUB_EXTENSION};

/// Prefix of stub package filenames requested through channel URLs.
pub const STUB_FILENAME_PREFIX: &str = "_c";

/// Filesystem-backed stub store.
#[derive(Debug, Clone)]
pub struct StubStore {
    layout: StorageLayout,
}

/// An in-progress stub upload.
#[derive(Debug)]
pub struct StubUpload {
    writer: AtomicWriter,
    layout: StorageLayout,
}

impl StubUpload {
    /// Append a chunk of the uploaded package.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        self.writer.write_chunk(chunk).await
    }

    /// Hash the complete upload and move it to its content address.
    pub async fn finish(self) -> Result<ShortHash, RepoError> {
        let hash = ShortHash::from_digest(&self.writer.content_digest());
        let target = self.layout.stub_path(&hash);
        let committed = self.writer.commit(&target).await?;
        tracing::info!(
            %hash,
            size = committed.size,
            path = %committed.path.display(),
            "added stub"
        );
        Ok(hash)
    }
}

impl StubStore {
    /// Create a stub store over the given layout.
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Begin a streamed upload.
    pub async fn begin(&self) -> Result<StubUpload, RepoError> {
        let writer = AtomicWriter::create_in(&self.layout.stubs_dir()).await?;
        Ok(StubUpload {
            writer,
            layout: self.layout.clone(),
        })
    }

    /// Store everything read from `reader`, returning its short hash.
    pub async fn put<R>(&self, reader: &mut R) -> Result<ShortHash, RepoError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut upload = self.begin().await?;
        upload.writer.write_from(reader).await?;
        upload.finish().await
    }

    /// List the hashes of all stored stubs, sorted.
    ///
    /// Only regular files named `<hash8>.tar.bz2` are reported; in-flight
    /// uploads and stray files are skipped.
    pub async fn list(&self) -> Result<BTreeSet<ShortHash>, RepoError> {
        let dir = self.layout.stubs_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(RepoError::storage("creating", &dir))?;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(RepoError::storage("listing", &dir))?;
        let suffix = format!(".{STUB_EXTENSION}");
        let mut hashes = BTreeSet::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(RepoError::storage("listing", &dir))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(RepoError::storage("inspecting", &entry.path()))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_staging_file(name) {
                continue;
            }
            if let Some(hash) = name
                .strip_suffix(&suffix)
                .and_then(|stem| ShortHash::parse(stem).ok())
            {
                hashes.insert(hash);
            }
        }
        Ok(hashes)
    }

    /// Resolve a hash to the path of a stored stub.
    ///
    /// A directory or special file at the stub path is reported as missing.
    pub async fn locate(&self, hash: &ShortHash) -> Result<PathBuf, RepoError> {
        let path = self.layout.stub_path(hash);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(RepoError::NotFound(format!("stub {hash} is not a regular file"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RepoError::NotFound(format!("hash {hash} not found")))
            }
            Err(e) => Err(RepoError::storage("inspecting", &path)(e)),
        }
    }
}

/// Extract the short hash from a stub package filename.
///
/// Stub packages are published as `_c<anything>_<hash8>.tar.bz2`. Returns
/// `Ok(None)` for filenames that do not follow the convention and a
/// validation error when the embedded hash is malformed.
pub fn hash_from_filename(filename: &str) -> Result<Option<ShortHash>, RepoError> {
    let Some(stem) = filename.strip_suffix(&format!(".{STUB_EXTENSION}")) else {
        return Ok(None);
    };
    if !stem.starts_with(STUB_FILENAME_PREFIX) {
        return Ok(None);
    }
    let token = stem.rsplit('_').next().unwrap_or(stem);
    Ok(Some(ShortHash::parse(token)?))
}
