//! # Wheel Index Cache
//!
//! Single-slot, lazily loaded cache of the wheel index document
//! (`wheel_cache.json`, a flat `{key: url}` JSON object).
//!
//! The slot is a `parking_lot::RwLock` that is never held across an `.await`.
//! Loading reads and parses the document outside the lock, then installs the
//! result only if no [`WheelIndexCache::invalidate`] happened in between. A
//! loader racing an upload therefore never pins the old document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RepoError;

/// Parsed wheel index: build key → download URL.
pub type WheelIndex = HashMap<String, String>;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    index: Option<Arc<WheelIndex>>,
}

/// Process-wide memo of the parsed wheel index document.
#[derive(Debug, Clone)]
pub struct WheelIndexCache {
    path: PathBuf,
    slot: Arc<RwLock<Slot>>,
}

impl WheelIndexCache {
    /// Create an unloaded cache backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: Arc::new(RwLock::new(Slot::default())),
        }
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a parsed index is currently held.
    pub fn is_loaded(&self) -> bool {
        self.slot.read().index.is_some()
    }

    /// Drop the cached index. The next lookup reloads from disk.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write();
        slot.generation = slot.generation.wrapping_add(1);
        slot.index = None;
        tracing::debug!(generation = slot.generation, "wheel index cache invalidated");
    }

    /// Return the cached index, loading it from disk if needed.
    ///
    /// # Errors
    ///
    /// [`RepoError::Misconfigured`] if the document is missing, is not a
    /// `{string: string}` object, or is empty.
    pub async fn get_or_load(&self) -> Result<Arc<WheelIndex>, RepoError> {
        let generation = {
            let slot = self.slot.read();
            if let Some(index) = &slot.index {
                return Ok(Arc::clone(index));
            }
            slot.generation
        };

        let index = Arc::new(load_index(&self.path).await?);

        let mut slot = self.slot.write();
        if slot.generation == generation {
            slot.index = Some(Arc::clone(&index));
            tracing::info!(entries = index.len(), "wheel index loaded");
        }
        Ok(index)
    }

    /// Look up a single key.
    pub async fn lookup(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.get_or_load().await?.get(key).cloned())
    }
}

async fn load_index(path: &Path) -> Result<WheelIndex, RepoError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RepoError::Misconfigured(
                "wheel index document has not been uploaded".into(),
            ));
        }
        Err(e) => return Err(RepoError::storage("reading", path)(e)),
    };
    let index: WheelIndex = serde_json::from_slice(&bytes)
        .map_err(|e| RepoError::Misconfigured(format!("wheel index document is invalid: {e}")))?;
    if index.is_empty() {
        return Err(RepoError::Misconfigured("wheel index document is empty".into()));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &tempfile::TempDir) -> WheelIndexCache {
        WheelIndexCache::new(dir.path().join("wheel_cache.json"))
    }

    #[tokio::test]
    async fn loads_lazily_and_memoizes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        tokio::fs::write(cache.path(), br#"{"123": "https://example.org/x.whl"}"#)
            .await
            .unwrap();
        assert!(!cache.is_loaded());
        assert_eq!(
            cache.lookup("123").await.unwrap().as_deref(),
            Some("https://example.org/x.whl")
        );
        assert!(cache.is_loaded());

        // A rewrite without invalidation is not observed.
        tokio::fs::write(cache.path(), br#"{"123": "https://example.org/y.whl"}"#)
            .await
            .unwrap();
        assert_eq!(
            cache.lookup("123").await.unwrap().as_deref(),
            Some("https://example.org/x.whl")
        );

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert_eq!(
            cache.lookup("123").await.unwrap().as_deref(),
            Some("https://example.org/y.whl")
        );
    }

    #[tokio::test]
    async fn unknown_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        tokio::fs::write(cache.path(), br#"{"1": "u"}"#).await.unwrap();
        assert_eq!(cache.lookup("2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_document_is_misconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let err = cache_in(&dir).lookup("1").await.unwrap_err();
        assert!(matches!(err, RepoError::Misconfigured(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_or_corrupt_document_is_misconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        for body in [&b"{}"[..], b"not json", b"[1, 2]", br#"{"k": 1}"#] {
            tokio::fs::write(cache.path(), body).await.unwrap();
            cache.invalidate();
            let err = cache.lookup("k").await.unwrap_err();
            assert!(matches!(err, RepoError::Misconfigured(_)), "got {err:?}");
            assert!(!cache.is_loaded());
        }
    }

    #[tokio::test]
    async fn clones_share_one_slot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let other = cache.clone();
        tokio::fs::write(cache.path(), br#"{"k": "v"}"#).await.unwrap();
        cache.get_or_load().await.unwrap();
        assert!(other.is_loaded());
        other.invalidate();
        assert!(!cache.is_loaded());
    }
}
