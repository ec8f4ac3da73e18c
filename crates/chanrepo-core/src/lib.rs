#![deny(missing_docs)]

//! # chanrepo-core: Artifact Storage and Resolution
//!
//! The storage and resolution layer of the chanrepo package-channel server.
//! It has no HTTP dependency; the API crate maps its operations onto routes.
//!
//! ## Components
//!
//! - [`identifier`]: validated newtypes for channel names, architectures and
//!   short hashes. Nothing else in the crate accepts raw strings for paths.
//! - [`layout`]: the on-disk path convention, as pure functions.
//! - [`atomic`]: same-directory temp file + rename uploads.
//! - [`index`]: per-channel/arch index documents and channel deletion.
//! - [`stub`]: content-addressed stub packages.
//! - [`wheel`] / [`wheel_cache`]: wheel filename → redirect URL.
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/channels/<channel>/[<subchannel>/]<arch>/<channel>.json
//! <root>/stubs/<hash8>.tar.bz2
//! <root>/wheel_cache.json
//! ```
//!
//! The filesystem is the only source of truth. The one piece of in-process
//! state is the wheel index cache, owned by [`Repository`].

pub mod atomic;
pub mod error;
pub mod identifier;
pub mod index;
pub mod layout;
pub mod stub;
pub mod wheel;
pub mod wheel_cache;

use std::path::PathBuf;

use tokio::io::AsyncRead;
use url::Url;

pub use atomic::{write_atomically, AtomicWriter, CommittedFile};
pub use error::{RepoError, ValidationError};
pub use identifier::{Arch, ChannelName, ShortHash, RESERVED_CHANNEL};
pub use index::{ChannelRemoval, IndexStore, IndexUpload};
pub use layout::{IndexLocation, StorageLayout};
pub use stub::{StubStore, StubUpload};
pub use wheel::{ResolutionMode, WheelContext, WheelResolver, DEFAULT_PUBLIC_HOST};
pub use wheel_cache::WheelIndexCache;

/// Settings needed to open a [`Repository`].
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Storage root directory.
    pub root: PathBuf,
    /// Host used for public wheel redirects.
    pub public_host: String,
    /// Base URI of the private wheel mirror, if one is deployed.
    pub mirror: Option<Url>,
}

impl RepositoryConfig {
    /// Configuration with the default public host and no mirror.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_host: DEFAULT_PUBLIC_HOST.to_string(),
            mirror: None,
        }
    }
}

/// All repository stores over one storage root. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Repository {
    layout: StorageLayout,
    indexes: IndexStore,
    stubs: StubStore,
    wheels: WheelResolver,
}

impl Repository {
    /// Open a repository. Directories are created lazily on first write.
    pub fn open(config: RepositoryConfig) -> Self {
        let layout = StorageLayout::new(config.root);
        let cache = WheelIndexCache::new(layout.wheel_index_path());
        Self {
            indexes: IndexStore::new(layout.clone()),
            stubs: StubStore::new(layout.clone()),
            wheels: WheelResolver::new(config.public_host, config.mirror, cache),
            layout,
        }
    }

    /// The path convention in use.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Index documents.
    pub fn indexes(&self) -> &IndexStore {
        &self.indexes
    }

    /// Stub packages.
    pub fn stubs(&self) -> &StubStore {
        &self.stubs
    }

    /// Wheel redirects.
    pub fn wheels(&self) -> &WheelResolver {
        &self.wheels
    }

    /// Begin a streamed replacement of the wheel index document.
    pub async fn begin_wheel_index_upload(&self) -> Result<AtomicWriter, RepoError> {
        let target = self.layout.wheel_index_path();
        let dir = target.parent().map(PathBuf::from).unwrap_or_default();
        AtomicWriter::create_in(&dir).await
    }

    /// Publish a staged wheel index document and drop the cached copy.
    pub async fn commit_wheel_index(&self, writer: AtomicWriter) -> Result<CommittedFile, RepoError> {
        let committed = writer.commit(&self.layout.wheel_index_path()).await?;
        self.wheels.cache().invalidate();
        tracing::info!(size = committed.size, "stored wheel index document");
        Ok(committed)
    }

    /// Replace the wheel index document with everything read from `reader`.
    pub async fn put_wheel_index<R>(&self, reader: &mut R) -> Result<CommittedFile, RepoError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut writer = self.begin_wheel_index_upload().await?;
        writer.write_from(reader).await?;
        self.commit_wheel_index(writer).await
    }
}
