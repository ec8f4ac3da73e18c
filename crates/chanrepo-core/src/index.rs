//! # Index Store
//!
//! Index documents (`repodata`) are opaque byte blobs, one per
//! (channel, subchannel, arch). They are replaced wholesale on upload through
//! the atomic file store and removed only by deleting their channel.

use std::path::PathBuf;

use tokio::io::AsyncRead;

use crate::atomic::{write_atomically, AtomicWriter, CommittedFile};
use crate::error::{RepoError, ValidationError};
use crate::identifier::ChannelName;
use crate::layout::{IndexLocation, StorageLayout};

/// Outcome of a channel deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRemoval {
    /// The channel tree existed and was removed.
    Removed,
    /// There was nothing to remove.
    Absent,
}

impl ChannelRemoval {
    /// Status label reported to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Removed => "success",
            Self::Absent => "absent",
        }
    }
}

/// Filesystem-backed index document store.
#[derive(Debug, Clone)]
pub struct IndexStore {
    layout: StorageLayout,
}

/// An in-progress index upload bound to its destination.
#[derive(Debug)]
pub struct IndexUpload {
    writer: AtomicWriter,
    target: PathBuf,
    location: IndexLocation,
}

impl IndexUpload {
    /// Append a chunk of the uploaded document.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), RepoError> {
        self.writer.write_chunk(chunk).await
    }

    /// Atomically publish the document.
    pub async fn finish(self) -> Result<CommittedFile, RepoError> {
        let committed = self.writer.commit(&self.target).await?;
        tracing::info!(location = %self.location, size = committed.size, "stored index document");
        Ok(committed)
    }
}

impl IndexStore {
    /// Create an index store over the given layout.
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Path of an existing index document.
    pub async fn locate(&self, location: &IndexLocation) -> Result<PathBuf, RepoError> {
        let path = self.layout.index_path(location);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(RepoError::NotFound(format!("index for {location}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RepoError::NotFound(format!("index for {location}")))
            }
            Err(e) => Err(RepoError::storage("inspecting", &path)(e)),
        }
    }

    /// Begin a streamed upload for `location`. Creates the channel directories.
    pub async fn begin_upload(&self, location: IndexLocation) -> Result<IndexUpload, RepoError> {
        check_subchannel(location.subchannel.as_ref())?;
        let target = self.layout.index_path(&location);
        let dir = target.parent().map(PathBuf::from).unwrap_or_default();
        let writer = AtomicWriter::create_in(&dir).await?;
        Ok(IndexUpload {
            writer,
            target,
            location,
        })
    }

    /// Replace the document at `location` with everything read from `reader`.
    pub async fn put<R>(&self, location: &IndexLocation, reader: &mut R) -> Result<CommittedFile, RepoError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        check_subchannel(location.subchannel.as_ref())?;
        let committed = write_atomically(&self.layout.index_path(location), reader).await?;
        tracing::info!(%location, size = committed.size, "stored index document");
        Ok(committed)
    }

    /// Recursively delete a channel, or one subchannel within it.
    pub async fn delete_channel(
        &self,
        channel: &ChannelName,
        subchannel: Option<&ChannelName>,
    ) -> Result<ChannelRemoval, RepoError> {
        check_subchannel(subchannel)?;
        let root = self.layout.channel_root(channel, subchannel);
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {
                tracing::info!(path = %root.display(), "deleted channel");
                Ok(ChannelRemoval::Removed)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %root.display(), "channel already absent");
                Ok(ChannelRemoval::Absent)
            }
            Err(e) => Err(RepoError::storage("deleting", &root)(e)),
        }
    }
}

/// A subchannel named after an arch would share the parent's arch directory.
fn check_subchannel(subchannel: Option<&ChannelName>) -> Result<(), ValidationError> {
    match subchannel {
        Some(sub) if sub.shadows_arch() => Err(ValidationError::ArchSubchannel(sub.to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Arch;

    fn store() -> (tempfile::TempDir, IndexStore) {
        let root = tempfile::tempdir().unwrap();
        let store = IndexStore::new(StorageLayout::new(root.path()));
        (root, store)
    }

    fn loc(channel: &str, arch: Arch) -> IndexLocation {
        IndexLocation::new(ChannelName::parse(channel).unwrap(), arch)
    }

    #[tokio::test]
    async fn upload_then_read_round_trips() {
        let (_root, store) = store();
        let location = loc("mychan", Arch::Linux64);
        let body = br#"{"info":{"subdir":"linux-64"},"packages":{}}"#;
        store.put(&location, &mut &body[..]).await.unwrap();
        let path = store.locate(&location).await.unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), body);
    }

    #[tokio::test]
    async fn streamed_upload_round_trips() {
        let (_root, store) = store();
        let location = loc("c", Arch::Noarch)
            .with_subchannel(Some(ChannelName::parse("sub").unwrap()));
        let mut upload = store.begin_upload(location.clone()).await.unwrap();
        upload.write_chunk(b"{\"a\":").await.unwrap();
        upload.write_chunk(b"1}").await.unwrap();
        upload.finish().await.unwrap();
        let path = store.locate(&location).await.unwrap();
        assert!(path.ends_with("channels/c/sub/noarch/c.json"));
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let (_root, store) = store();
        let err = store.locate(&loc("nope", Arch::Win64)).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn delete_removes_every_arch() {
        let (root, store) = store();
        for arch in Arch::ALL {
            store.put(&loc("gone", arch), &mut &b"{}"[..]).await.unwrap();
        }
        store.put(&loc("kept", Arch::Noarch), &mut &b"{}"[..]).await.unwrap();

        let channel = ChannelName::parse("gone").unwrap();
        assert_eq!(
            store.delete_channel(&channel, None).await.unwrap(),
            ChannelRemoval::Removed
        );
        assert!(!root.path().join("channels/gone").exists());
        for arch in Arch::ALL {
            let err = store.locate(&loc("gone", arch)).await.unwrap_err();
            assert!(matches!(err, RepoError::NotFound(_)));
        }
        assert!(store.locate(&loc("kept", Arch::Noarch)).await.is_ok());
    }

    #[tokio::test]
    async fn delete_subchannel_keeps_parent() {
        let (_root, store) = store();
        let chan = ChannelName::parse("c").unwrap();
        let sub = ChannelName::parse("s").unwrap();
        let top = loc("c", Arch::Noarch);
        let nested = loc("c", Arch::Noarch).with_subchannel(Some(sub.clone()));
        store.put(&top, &mut &b"top"[..]).await.unwrap();
        store.put(&nested, &mut &b"nested"[..]).await.unwrap();

        store.delete_channel(&chan, Some(&sub)).await.unwrap();
        assert!(store.locate(&nested).await.is_err());
        assert!(store.locate(&top).await.is_ok());
    }

    #[tokio::test]
    async fn arch_named_subchannel_is_rejected_before_touching_disk() {
        let (root, store) = store();
        let chan = ChannelName::parse("c").unwrap();
        let noarch = ChannelName::parse("noarch").unwrap();
        let top = loc("c", Arch::Linux64);
        store.put(&top, &mut &b"top"[..]).await.unwrap();

        let err = store.delete_channel(&chan, Some(&noarch)).await.unwrap_err();
        assert!(
            matches!(err, RepoError::Validation(ValidationError::ArchSubchannel(_))),
            "got {err:?}"
        );
        let shadowing = loc("c", Arch::Linux64).with_subchannel(Some(noarch));
        let err = store.put(&shadowing, &mut &b"x"[..]).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)), "got {err:?}");
        assert!(store.begin_upload(shadowing).await.is_err());

        assert!(store.locate(&top).await.is_ok());
        assert!(!root.path().join("channels/c/noarch").exists());
    }

    #[tokio::test]
    async fn delete_absent_channel_is_tolerated() {
        let (_root, store) = store();
        let channel = ChannelName::parse("never").unwrap();
        assert_eq!(
            store.delete_channel(&channel, None).await.unwrap(),
            ChannelRemoval::Absent
        );
    }
}
