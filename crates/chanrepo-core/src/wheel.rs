//! # Wheel Resolver
//!
//! Wheels are never stored locally. A request for a `.whl` file inside a
//! channel is answered with a redirect, and the redirect target depends on
//! the [`ResolutionMode`] selected by the route that received the request:
//!
//! | Mode            | Target                                                        |
//! |-----------------|---------------------------------------------------------------|
//! | `Public`        | `<host>/packages/<py>/<n>/<name>/<filename>` on the public index |
//! | `IndexCache`    | URL stored under the filename's trailing key in the wheel index |
//! | `PrivateMirror` | `<mirror>/<channel>[/<sub>]/simple/<name>/<filename>`           |
//!
//! Filenames follow the binary distribution format
//! `<name>-<version>[-<build>]-<python>-<abi>-<platform>.whl`; only the
//! dash-delimited segments that each mode needs are interpreted.

use url::Url;

use crate::error::RepoError;
use crate::identifier::ChannelName;
use crate::wheel_cache::WheelIndexCache;

/// Default host for public wheel downloads.
pub const DEFAULT_PUBLIC_HOST: &str = "https://files.pythonhosted.org";

/// File extension of wheel artifacts.
pub const WHEEL_EXTENSION: &str = ".whl";

/// How a wheel filename is turned into a download URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionMode {
    /// Build a deterministic URL on the public package index.
    Public,
    /// Look the filename's build key up in the uploaded wheel index.
    IndexCache,
    /// Build a URL on the operator's private mirror.
    PrivateMirror,
}

impl ResolutionMode {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::IndexCache => "index_cache",
            Self::PrivateMirror => "private_mirror",
        }
    }
}

/// The channel a wheel was requested through.
#[derive(Debug, Clone, Copy)]
pub struct WheelContext<'a> {
    /// Top-level channel.
    pub channel: &'a ChannelName,
    /// Optional subchannel.
    pub subchannel: Option<&'a ChannelName>,
}

/// Normalize a distribution name: collapse runs of `-`, `_`, `.` into a
/// single `-` and lowercase.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator = false;
    for c in raw.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Append path segments to `base`, percent-encoding each one.
///
/// A trailing slash on `base` does not produce an empty segment.
fn join_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<String, RepoError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RepoError::Misconfigured(format!("{base} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

fn unredirectable(filename: &str) -> RepoError {
    RepoError::NotFound(format!("wheel {filename} cannot be redirected"))
}

/// Public-index URL for a wheel filename.
///
/// Requires at least `<name>-<version>-<python>` segments. Every path
/// segment is percent-encoded, so a filename cannot smuggle a query or a
/// control byte into the redirect.
pub fn public_url(host: &str, filename: &str) -> Result<String, RepoError> {
    let mut segments = filename.split('-');
    let (Some(raw_name), Some(_version), Some(python_tag)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(unredirectable(filename));
    };
    let name = normalize_name(raw_name);
    let Some(initial) = name.chars().next() else {
        return Err(unredirectable(filename));
    };
    let base = Url::parse(host)
        .map_err(|e| RepoError::Misconfigured(format!("public wheel host {host:?}: {e}")))?;
    let initial = initial.to_string();
    join_segments(
        &base,
        ["packages", python_tag, initial.as_str(), name.as_str(), filename],
    )
}

/// Private-mirror URL for a wheel filename.
pub fn mirror_url(mirror: &Url, context: WheelContext<'_>, filename: &str) -> Result<String, RepoError> {
    let raw_name = filename.split('-').next().unwrap_or_default();
    let name = normalize_name(raw_name);
    if name.is_empty() {
        return Err(unredirectable(filename));
    }
    let channel_path = std::iter::once(context.channel.as_str())
        .chain(context.subchannel.map(ChannelName::as_str));
    join_segments(
        mirror,
        channel_path.chain(["simple", name.as_str(), filename]),
    )
}

/// Wheel-index lookup key: the last dash-delimited segment of the filename
/// without its `.whl` extension.
pub fn cache_key(filename: &str) -> &str {
    let stem = filename.strip_suffix(WHEEL_EXTENSION).unwrap_or(filename);
    stem.rsplit('-').next().unwrap_or(stem)
}

/// Resolves wheel filenames to redirect targets for every mode.
#[derive(Debug, Clone)]
pub struct WheelResolver {
    public_host: String,
    mirror: Option<Url>,
    cache: WheelIndexCache,
}

impl WheelResolver {
    /// Create a resolver.
    pub fn new(public_host: impl Into<String>, mirror: Option<Url>, cache: WheelIndexCache) -> Self {
        Self {
            public_host: public_host.into(),
            mirror,
            cache,
        }
    }

    /// The wheel index cache used by [`ResolutionMode::IndexCache`].
    pub fn cache(&self) -> &WheelIndexCache {
        &self.cache
    }

    /// Resolve `filename` (including its `.whl` extension) to a URL.
    pub async fn resolve(
        &self,
        mode: ResolutionMode,
        context: WheelContext<'_>,
        filename: &str,
    ) -> Result<String, RepoError> {
        let url = match mode {
            ResolutionMode::Public => public_url(&self.public_host, filename)?,
            ResolutionMode::IndexCache => {
                let key = cache_key(filename);
                let raw = self
                    .cache
                    .lookup(key)
                    .await?
                    .ok_or_else(|| RepoError::NotFound(format!("no wheel indexed under key {key}")))?;
                Url::parse(&raw)
                    .map_err(|e| {
                        RepoError::Misconfigured(format!("wheel index entry {key} is not a URL: {e}"))
                    })?
                    .into()
            }
            ResolutionMode::PrivateMirror => {
                let mirror = self.mirror.as_ref().ok_or_else(|| {
                    RepoError::Misconfigured("private mirror URI is not configured".into())
                })?;
                mirror_url(mirror, context, filename)?
            }
        };
        tracing::debug!(mode = mode.as_str(), %filename, %url, "resolved wheel");
        Ok(url)
    }
}
