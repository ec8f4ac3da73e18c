//! # Storage Layout
//!
//! Pure mapping from validated identifiers to on-disk locations. Every path
//! the repository reads or writes is produced here:
//!
//! ```text
//! <root>/channels/<channel>/[<subchannel>/]<arch>/<channel>.json
//! <root>/stubs/<hash8>.tar.bz2
//! <root>/wheel_cache.json
//! ```
//!
//! The index filename always takes the top-level channel name as its stem,
//! including for subchannels.

use std::path::{Path, PathBuf};

use crate::identifier::{Arch, ChannelName, ShortHash, RESERVED_CHANNEL};

/// File extension of stored stub packages.
pub const STUB_EXTENSION: &str = "tar.bz2";

/// Location of one index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLocation {
    /// Top-level channel.
    pub channel: ChannelName,
    /// Optional nested subchannel.
    pub subchannel: Option<ChannelName>,
    /// Target platform.
    pub arch: Arch,
}

impl IndexLocation {
    /// Construct a location for a top-level channel.
    pub fn new(channel: ChannelName, arch: Arch) -> Self {
        Self {
            channel,
            subchannel: None,
            arch,
        }
    }

    /// Set the subchannel.
    pub fn with_subchannel(mut self, subchannel: Option<ChannelName>) -> Self {
        self.subchannel = subchannel;
        self
    }
}

impl std::fmt::Display for IndexLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subchannel {
            Some(sub) => write!(f, "{}/{}/{}", self.channel, sub, self.arch),
            None => write!(f, "{}/{}", self.channel, self.arch),
        }
    }
}

/// Filesystem layout rooted at a storage directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Create a layout rooted at `root`. The directory does not need to exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all channels.
    pub fn channels_dir(&self) -> PathBuf {
        self.root.join("channels")
    }

    /// Root directory of a channel, or of a subchannel within it.
    pub fn channel_root(&self, channel: &ChannelName, subchannel: Option<&ChannelName>) -> PathBuf {
        let dir = self.channels_dir().join(channel.as_str());
        match subchannel {
            Some(sub) => dir.join(sub.as_str()),
            None => dir,
        }
    }

    /// Path of the index document for a location.
    pub fn index_path(&self, location: &IndexLocation) -> PathBuf {
        self.channel_root(&location.channel, location.subchannel.as_ref())
            .join(location.arch.as_str())
            .join(format!("{}.json", location.channel))
    }

    /// Directory holding content-addressed stubs.
    pub fn stubs_dir(&self) -> PathBuf {
        self.root.join("stubs")
    }

    /// Path of the stub with the given hash.
    pub fn stub_path(&self, hash: &ShortHash) -> PathBuf {
        self.stubs_dir().join(format!("{hash}.{STUB_EXTENSION}"))
    }

    /// Path of the wheel index document.
    pub fn wheel_index_path(&self) -> PathBuf {
        self.root.join(format!("{RESERVED_CHANNEL}.json"))
    }
}
