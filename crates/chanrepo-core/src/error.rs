//! # Error Hierarchy
//!
//! Structured error types for the storage and resolution core, built with
//! `thiserror`. No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! The variants follow the four outcome classes every caller must be able to
//! tell apart: a malformed identifier, a missing artifact, a server that was
//! never configured for the requested operation, and a filesystem failure.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Top-level error type for repository operations.
#[derive(Error, Debug)]
pub enum RepoError {
    /// An identifier failed validation. Raised before any filesystem access.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The requested artifact, index document, or wheel key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation needs operator-supplied state that is missing or corrupt
    /// (mirror URI, wheel index document).
    #[error("server misconfigured: {0}")]
    Misconfigured(String),

    /// A filesystem operation failed.
    #[error("storage error while {op} {}: {source}", path.display())]
    Storage {
        /// The operation that failed (e.g. "renaming", "creating").
        op: &'static str,
        /// The path the operation targeted.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    /// Build a closure that wraps an `io::Error` with operation and path context.
    ///
    /// ```ignore
    /// tokio::fs::create_dir_all(&dir).await.map_err(RepoError::storage("creating", &dir))?;
    /// ```
    pub fn storage(op: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Storage { op, path, source }
    }
}

/// Validation errors for untrusted identifiers.
///
/// Each error carries the rejected input so operators can diagnose bad client
/// requests from logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Channel or subchannel name does not match `^[a-z0-9_]+$`.
    #[error("invalid channel name: \"{0}\" (expected [a-z0-9_]+)")]
    InvalidChannel(String),

    /// Channel name is syntactically valid but reserved for internal use.
    #[error("channel name \"{0}\" is reserved")]
    ReservedChannel(String),

    /// Subchannel name equals an architecture tag, so its directory would
    /// collide with the parent channel's arch directory.
    #[error("subchannel name \"{0}\" collides with an arch directory")]
    ArchSubchannel(String),

    /// Architecture tag is not one of the supported platforms.
    #[error("invalid arch name: \"{0}\" (expected one of noarch, osx-arm64, osx-64, linux-64, win-64)")]
    InvalidArch(String),

    /// Short hash token is not exactly 8 lowercase hex characters.
    #[error("invalid hash: \"{0}\" (expected 8 lowercase hex characters)")]
    InvalidHash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_and_keeps_input() {
        let err = RepoError::from(ValidationError::InvalidArch("amd64".into()));
        assert!(matches!(err, RepoError::Validation(ValidationError::InvalidArch(_))));
        assert!(err.to_string().contains("amd64"));
    }

    #[test]
    fn storage_error_carries_path_and_op() {
        let path = Path::new("/srv/repo/stubs");
        let err = RepoError::storage("creating", path)(std::io::Error::other("disk full"));
        let msg = err.to_string();
        assert!(msg.contains("creating"), "got: {msg}");
        assert!(msg.contains("/srv/repo/stubs"), "got: {msg}");
        assert!(msg.contains("disk full"), "got: {msg}");
    }

    #[test]
    fn reserved_channel_message() {
        let err = ValidationError::ReservedChannel("wheel_cache".into());
        assert_eq!(err.to_string(), "channel name \"wheel_cache\" is reserved");
    }
}
