//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! The state holds no artifact data. Everything durable lives on disk under
//! the storage root; the [`Repository`] only carries the path convention and
//! the wheel index cache.

use std::path::PathBuf;
use std::sync::Arc;

use chanrepo_core::{Repository, RepositoryConfig, DEFAULT_PUBLIC_HOST};
use metrics_exporter_prometheus::PrometheusHandle;
use url::Url;

/// Operator credentials for authenticated routes.
///
/// Custom `Debug` redacts the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Storage root.
    pub repo_path: PathBuf,
    /// `None` when either credential variable is unset or empty. Authenticated
    /// routes then answer 500.
    pub credentials: Option<Credentials>,
    /// Base URI of the private wheel mirror.
    pub private_mirror: Option<Url>,
    /// Host for public wheel redirects.
    pub public_wheel_host: String,
    /// Upload body limit in bytes. `None` disables the limit.
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `REPO_PATH` (default: `repodata/` next to the executable)
    /// - `REPO_USERNAME`, `REPO_PASSWORD`
    /// - `PRIVATE_MIRROR_URI` (optional)
    /// - `PUBLIC_WHEEL_HOST` (default: `https://files.pythonhosted.org`)
    /// - `MAX_UPLOAD_BYTES` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.is_empty());

        let repo_path = match non_empty("REPO_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_repo_path(),
        };

        let credentials = match (non_empty("REPO_USERNAME"), non_empty("REPO_PASSWORD")) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let private_mirror = non_empty("PRIVATE_MIRROR_URI")
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|e| ConfigError::InvalidUrl("PRIVATE_MIRROR_URI".to_string(), e.to_string()))
            })
            .transpose()?;

        let public_wheel_host =
            non_empty("PUBLIC_WHEEL_HOST").unwrap_or_else(|| DEFAULT_PUBLIC_HOST.to_string());

        let max_upload_bytes = non_empty("MAX_UPLOAD_BYTES")
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|e| ConfigError::InvalidNumber("MAX_UPLOAD_BYTES".to_string(), e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            repo_path,
            credentials,
            private_mirror,
            public_wheel_host,
            max_upload_bytes,
        })
    }

    /// Configuration rooted at `repo_path` with no credentials or mirror.
    pub fn with_root(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            credentials: None,
            private_mirror: None,
            public_wheel_host: DEFAULT_PUBLIC_HOST.to_string(),
            max_upload_bytes: None,
        }
    }
}

fn default_repo_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("repodata")))
        .unwrap_or_else(|| PathBuf::from("repodata"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid number for {0}: {1}")]
    InvalidNumber(String, String),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    /// Render handle of the installed Prometheus recorder, if any.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("repo", &self.repo)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl AppState {
    /// Open the repository described by `config`.
    pub fn new(config: AppConfig) -> Self {
        let repo = Repository::open(RepositoryConfig {
            root: config.repo_path.clone(),
            public_host: config.public_wheel_host.clone(),
            mirror: config.private_mirror.clone(),
        });
        Self {
            config: Arc::new(config),
            repo,
            metrics: None,
        }
    }

    /// Attach a Prometheus render handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
