//! # Identifier Newtypes
//!
//! Validated newtypes for every untrusted identifier that ends up in a
//! filesystem path. A [`ChannelName`], [`Arch`], or [`ShortHash`] can only be
//! obtained through its parser, so code holding one may join it into a path
//! without further sanitization.
//!
//! ## Rules
//!
//! - Channel and subchannel names: `^[a-z0-9_]+$`, excluding the reserved
//!   name [`RESERVED_CHANNEL`]. No `.` and no `/`, so a name can never walk
//!   out of the storage root. A subchannel may not be named `noarch` (the
//!   only arch tag the name rules admit).
//! - Architectures: exactly one of `noarch`, `osx-arm64`, `osx-64`,
//!   `linux-64`, `win-64`. No case folding.
//! - Short hashes: `^[a-f0-9]{8}$`.

use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ValidationError;

/// Channel name reserved for the wheel index document (`wheel_cache.json`).
pub const RESERVED_CHANNEL: &str = "wheel_cache";

/// Number of hex characters kept from a SHA-256 digest.
pub const SHORT_HASH_LEN: usize = 8;

// ---------------------------------------------------------------------------
// ChannelName
// ---------------------------------------------------------------------------

/// A validated channel or subchannel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Parse a channel name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidChannel`] if the name is empty or
    /// contains anything outside `[a-z0-9_]`, and
    /// [`ValidationError::ReservedChannel`] for [`RESERVED_CHANNEL`].
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let well_formed = !value.is_empty()
            && value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if !well_formed {
            return Err(ValidationError::InvalidChannel(value.to_string()));
        }
        if value == RESERVED_CHANNEL {
            return Err(ValidationError::ReservedChannel(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Parse a subchannel name.
    ///
    /// Subchannels live beside the parent's arch directories, so on top of
    /// the [`ChannelName::parse`] rules a subchannel may not be named after
    /// an [`Arch`].
    ///
    /// # Errors
    ///
    /// Everything [`ChannelName::parse`] returns, plus
    /// [`ValidationError::ArchSubchannel`].
    pub fn parse_subchannel(value: &str) -> Result<Self, ValidationError> {
        let name = Self::parse(value)?;
        if name.shadows_arch() {
            return Err(ValidationError::ArchSubchannel(value.to_string()));
        }
        Ok(name)
    }

    /// Whether this name is also an architecture tag.
    pub fn shadows_arch(&self) -> bool {
        Arch::parse(&self.0).is_ok()
    }

    /// Access the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Arch
// ---------------------------------------------------------------------------

/// Target platform of an index document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// Platform-independent packages.
    Noarch,
    /// macOS on Apple silicon.
    OsxArm64,
    /// macOS on x86_64.
    Osx64,
    /// Linux on x86_64.
    Linux64,
    /// Windows on x86_64.
    Win64,
}

impl Arch {
    /// Every supported architecture, in declaration order.
    pub const ALL: [Arch; 5] = [
        Arch::Noarch,
        Arch::OsxArm64,
        Arch::Osx64,
        Arch::Linux64,
        Arch::Win64,
    ];

    /// The directory name / URL segment for this architecture.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noarch => "noarch",
            Self::OsxArm64 => "osx-arm64",
            Self::Osx64 => "osx-64",
            Self::Linux64 => "linux-64",
            Self::Win64 => "win-64",
        }
    }

    /// Parse an architecture tag. Exact match only.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.as_str() == value)
            .ok_or_else(|| ValidationError::InvalidArch(value.to_string()))
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// ShortHash
// ---------------------------------------------------------------------------

/// The first 8 hex characters of a SHA-256 digest, used as a stub identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortHash(String);

impl ShortHash {
    /// Parse a short hash token received from a client.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let valid = value.len() == SHORT_HASH_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(ValidationError::InvalidHash(value.to_string()))
        }
    }

    /// Truncate a full SHA-256 digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let hex: String = digest[..SHORT_HASH_LEN / 2]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Self(hex)
    }

    /// Access the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ShortHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn channel_accepts_lowercase_digits_underscore() {
        for name in ["conda_forge", "abc", "a1_2", "_", "0"] {
            assert_eq!(ChannelName::parse(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn channel_rejects_traversal_and_separators() {
        for name in ["", "..", ".", "a/b", "a\\b", "../etc", "a.b", "A", "a-b", "a b", "é"] {
            assert_eq!(
                ChannelName::parse(name),
                Err(ValidationError::InvalidChannel(name.to_string())),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn channel_rejects_reserved_name() {
        assert_eq!(
            ChannelName::parse(RESERVED_CHANNEL),
            Err(ValidationError::ReservedChannel(RESERVED_CHANNEL.to_string()))
        );
    }

    #[test]
    fn subchannel_may_not_be_named_after_an_arch() {
        assert_eq!(
            ChannelName::parse_subchannel("noarch"),
            Err(ValidationError::ArchSubchannel("noarch".to_string()))
        );
        assert!(ChannelName::parse("noarch").unwrap().shadows_arch());
        assert_eq!(ChannelName::parse_subchannel("ml").unwrap().as_str(), "ml");
        assert_eq!(
            ChannelName::parse_subchannel("linux-64"),
            Err(ValidationError::InvalidChannel("linux-64".to_string()))
        );
    }

    #[test]
    fn arch_round_trips_every_variant() {
        for arch in Arch::ALL {
            assert_eq!(Arch::parse(arch.as_str()), Ok(arch));
        }
    }

    #[test]
    fn arch_is_exact_match() {
        for tag in ["Noarch", "linux-64 ", "linux", "osx-arm", "win-32", "linux-aarch64", ""] {
            assert!(Arch::parse(tag).is_err(), "{tag:?} should be rejected");
        }
    }

    #[test]
    fn short_hash_format() {
        assert!(ShortHash::parse("deadbeef").is_ok());
        assert!(ShortHash::parse("0123abcd").is_ok());
        for token in ["DEADBEEF", "deadbee", "deadbeef0", "deadbeeg", "../../..", ""] {
            assert!(ShortHash::parse(token).is_err(), "{token:?} should be rejected");
        }
    }

    #[test]
    fn short_hash_from_digest_is_prefix_of_hex() {
        let digest: [u8; 32] = Sha256::digest(b"hello").into();
        let hash = ShortHash::from_digest(&digest);
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(hash.as_str(), "2cf24dba");
        assert!(ShortHash::parse(hash.as_str()).is_ok());
    }

    #[test]
    fn short_hash_serializes_as_string() {
        let hash = ShortHash::parse("0a1b2c3d").unwrap();
        assert_eq!(serde_json::to_string(&hash).unwrap(), "\"0a1b2c3d\"");
    }

    proptest! {
        #[test]
        fn any_name_outside_charset_is_rejected(prefix in "[a-z0-9_]{0,8}", bad in "[^a-z0-9_]", suffix in "[a-z0-9_]{0,8}") {
            let name = format!("{prefix}{bad}{suffix}");
            prop_assert!(ChannelName::parse(&name).is_err());
        }

        #[test]
        fn any_name_inside_charset_is_accepted(name in "[a-z0-9_]{1,32}") {
            prop_assume!(name != RESERVED_CHANNEL);
            prop_assert!(ChannelName::parse(&name).is_ok());
        }

        #[test]
        fn unknown_arch_is_rejected(tag in "\\PC{0,16}") {
            prop_assume!(!Arch::ALL.iter().any(|a| a.as_str() == tag));
            prop_assert!(Arch::parse(&tag).is_err());
        }

        #[test]
        fn short_hash_matches_sha256_prefix(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let digest: [u8; 32] = Sha256::digest(&bytes).into();
            let full: String = digest.iter().map(|b| format!("{b:02x}")).collect();
            let short = ShortHash::from_digest(&digest);
            prop_assert_eq!(short.as_str(), &full[..8]);
        }
    }
}
