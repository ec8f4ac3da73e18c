//! # Atomic File Store
//!
//! Durable, atomic replacement of a file with streamed content.
//!
//! ## Protocol
//!
//! 1. Create the target's directory (idempotent).
//! 2. Create a temporary file in that same directory, so the final rename
//!    never crosses a filesystem boundary.
//! 3. Append chunks as they arrive, hashing them on the way through.
//! 4. Flush and `fsync` the temporary file.
//! 5. Rename it over the target in one step.
//!
//! Readers therefore see either the previous content or the new content, never
//! a prefix. Two uploads racing for the same target both succeed and the last
//! rename wins.
//!
//! An [`AtomicWriter`] that is dropped before [`AtomicWriter::commit`] (client
//! disconnect, cancelled future, error midway) deletes its temporary file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::RepoError;

/// Read size used when draining an [`AsyncRead`] into a writer.
pub const CHUNK_SIZE: usize = 64 * 1024;

const TEMP_PREFIX: &str = ".upload-";
const TEMP_SUFFIX: &str = ".tmp";

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedFile {
    /// Final location of the file.
    pub path: PathBuf,
    /// Number of bytes written.
    pub size: u64,
    /// SHA-256 of the committed content.
    pub digest: [u8; 32],
}

/// A pending upload staged in a temporary file next to its destination.
pub struct AtomicWriter {
    file: tokio::fs::File,
    temp: TempPath,
    dir: PathBuf,
    hasher: Sha256,
    written: u64,
}

impl std::fmt::Debug for AtomicWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicWriter")
            .field("temp", &self.temp.display())
            .field("written", &self.written)
            .finish()
    }
}

impl AtomicWriter {
    /// Stage a new upload in `dir`, creating the directory if needed.
    pub async fn create_in(dir: &Path) -> Result<Self, RepoError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(RepoError::storage("creating", dir))?;

        let staging = dir.to_path_buf();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(TEMP_SUFFIX)
                .tempfile_in(&staging)
        })
        .await
        .map_err(|e| RepoError::storage("creating temporary file in", dir)(std::io::Error::other(e)))?
        .map_err(RepoError::storage("creating temporary file in", dir))?;

        let (file, temp) = named.into_parts();
        tracing::trace!(temp = %temp.display(), "staged upload");

        Ok(Self {
            file: tokio::fs::File::from_std(file),
            temp,
            dir: dir.to_path_buf(),
            hasher: Sha256::new(),
            written: 0,
        })
    }

    /// Append a chunk to the staged file.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| RepoError::storage("writing", &self.temp)(e))?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Drain `reader` into the staged file in [`CHUNK_SIZE`] reads.
    pub async fn write_from<R>(&mut self, reader: &mut R) -> Result<(), RepoError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| RepoError::storage("reading upload for", &self.temp)(e))?;
            if n == 0 {
                return Ok(());
            }
            self.write_chunk(&buf[..n]).await?;
        }
    }

    /// SHA-256 of everything written so far.
    pub fn content_digest(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush, sync, and atomically rename the staged file onto `target`.
    ///
    /// `target` must be in the staging directory.
    pub async fn commit(self, target: &Path) -> Result<CommittedFile, RepoError> {
        if target.parent() != Some(self.dir.as_path()) {
            return Err(RepoError::storage("renaming onto", target)(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("target is outside staging directory {}", self.dir.display()),
            )));
        }

        let Self {
            mut file,
            temp,
            hasher,
            written,
            ..
        } = self;

        file.flush()
            .await
            .map_err(RepoError::storage("flushing", &temp))?;
        file.sync_all()
            .await
            .map_err(RepoError::storage("syncing", &temp))?;
        drop(file);

        let destination = target.to_path_buf();
        tokio::task::spawn_blocking(move || temp.persist(&destination))
            .await
            .map_err(|e| RepoError::storage("renaming onto", target)(std::io::Error::other(e)))?
            .map_err(|e| RepoError::storage("renaming onto", target)(e.error))?;

        Ok(CommittedFile {
            path: target.to_path_buf(),
            size: written,
            digest: hasher.finalize().into(),
        })
    }
}

/// Atomically replace `target` with everything read from `reader`.
pub async fn write_atomically<R>(target: &Path, reader: &mut R) -> Result<CommittedFile, RepoError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let dir = target.parent().ok_or_else(|| {
        RepoError::storage("resolving parent of", target)(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target has no parent directory",
        ))
    })?;
    let mut writer = AtomicWriter::create_in(dir).await?;
    writer.write_from(reader).await?;
    writer.commit(target).await
}

/// Whether a directory entry name belongs to an in-flight upload.
pub fn is_staging_file(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn write_creates_parent_dirs_and_content() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("a/b/c/index.json");
        let committed = write_atomically(&target, &mut &b"{\"packages\":{}}"[..])
            .await
            .unwrap();
        assert_eq!(committed.path, target);
        assert_eq!(committed.size, 15);
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"{\"packages\":{}}");
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_content() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("f.json");
        write_atomically(&target, &mut &b"old old old"[..]).await.unwrap();
        write_atomically(&target, &mut &b"new"[..]).await.unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"new");
        assert_eq!(dir_entries(root.path()).await, vec!["f.json".to_string()]);
    }

    #[tokio::test]
    async fn digest_matches_sha256_of_content() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = AtomicWriter::create_in(root.path()).await.unwrap();
        writer.write_chunk(b"hel").await.unwrap();
        writer.write_chunk(b"lo").await.unwrap();
        let expected: [u8; 32] = Sha256::digest(b"hello").into();
        assert_eq!(writer.content_digest(), expected);
        assert_eq!(writer.bytes_written(), 5);
        let committed = writer.commit(&root.path().join("x")).await.unwrap();
        assert_eq!(committed.digest, expected);
    }

    #[tokio::test]
    async fn staged_file_is_invisible_until_commit() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("index.json");
        let mut writer = AtomicWriter::create_in(root.path()).await.unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        assert!(!target.exists());
        let names = dir_entries(root.path()).await;
        assert_eq!(names.len(), 1);
        assert!(is_staging_file(&names[0]), "unexpected entry {names:?}");
        writer.commit(&target).await.unwrap();
        assert_eq!(dir_entries(root.path()).await, vec!["index.json".to_string()]);
    }

    #[tokio::test]
    async fn commit_outside_staging_directory_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("a");
        let elsewhere = root.path().join("b");
        tokio::fs::create_dir_all(&elsewhere).await.unwrap();
        let mut writer = AtomicWriter::create_in(&staging).await.unwrap();
        writer.write_chunk(b"misdirected").await.unwrap();

        let target = elsewhere.join("index.json");
        let err = writer.commit(&target).await.unwrap_err();
        match err {
            RepoError::Storage { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidInput);
            }
            other => panic!("expected storage error, got {other:?}"),
        }
        assert!(!target.exists());
        assert!(dir_entries(&staging).await.is_empty());
        assert!(dir_entries(&elsewhere).await.is_empty());
    }

    #[tokio::test]
    async fn dropped_writer_removes_temporary_file() {
        let root = tempfile::tempdir().unwrap();
        {
            let mut writer = AtomicWriter::create_in(root.path()).await.unwrap();
            writer.write_chunk(b"abandoned upload").await.unwrap();
        }
        assert!(dir_entries(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_upload_future_leaves_no_orphans() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("index.json");
        let (mut tx, mut rx) = tokio::io::duplex(16);
        let upload = {
            let target = target.clone();
            tokio::spawn(async move { write_atomically(&target, &mut rx).await })
        };
        tx.write_all(b"first bytes").await.unwrap();
        tokio::task::yield_now().await;
        upload.abort();
        let _ = upload.await;
        drop(tx);
        assert!(!target.exists());
        // A tempfile created on the blocking pool is released when that
        // thread hands back its result.
        let mut names = dir_entries(root.path()).await;
        for _ in 0..100 {
            if names.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            names = dir_entries(root.path()).await;
        }
        assert!(names.is_empty(), "orphaned files: {names:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_last_rename_wins() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("race.json");
        let a = vec![b'a'; 256 * 1024];
        let b = vec![b'b'; 300 * 1024];

        let (ra, rb) = tokio::join!(
            {
                let (target, a) = (target.clone(), a.clone());
                async move { write_atomically(&target, &mut a.as_slice()).await }
            },
            {
                let (target, b) = (target.clone(), b.clone());
                async move { write_atomically(&target, &mut b.as_slice()).await }
            }
        );
        ra.unwrap();
        rb.unwrap();

        let stored = tokio::fs::read(&target).await.unwrap();
        assert!(stored == a || stored == b, "stored content is a mix");
        assert_eq!(dir_entries(root.path()).await, vec!["race.json".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_observe_partial_content() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("index.json");
        let old = vec![b'o'; 512 * 1024];
        let new = vec![b'n'; 768 * 1024];
        write_atomically(&target, &mut old.as_slice()).await.unwrap();

        let writer = {
            let (target, new) = (target.clone(), new.clone());
            tokio::spawn(async move {
                for _ in 0..8 {
                    write_atomically(&target, &mut new.as_slice()).await.unwrap();
                }
            })
        };

        for _ in 0..64 {
            let seen = tokio::fs::read(&target).await.unwrap();
            assert!(seen == old || seen == new, "reader saw {} bytes", seen.len());
        }
        writer.await.unwrap();
    }
}
