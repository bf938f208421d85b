//! Kubernetes and kubeadm versions.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// A semantic Kubernetes component version such as `v1.19.0-alpha.1`.
///
/// The leading `v` is optional on input and always present on output.
/// Pre-releases order before their release (`v1.19.0-rc.0 < v1.19.0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KubeVersion(semver::Version);

impl KubeVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
        semver::Version::parse(raw)
            .map(Self)
            .map_err(|e| ParseError::InvalidVersion {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    /// True if this version is at or above `minimum`, pre-releases of the
    /// minimum minor included.
    pub fn is_at_least(&self, minimum: MinorVersion) -> bool {
        (self.0.major, self.0.minor) >= (minimum.major, minimum.minor)
    }
}

impl Display for KubeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for KubeVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for KubeVersion {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KubeVersion> for String {
    fn from(value: KubeVersion) -> Self {
        value.to_string()
    }
}

/// The lowest version of a `major.minor` line, i.e. `vX.Y.0-0`.
///
/// Used for feature gates: a gate at `v1.19` accepts `v1.19.0-alpha.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinorVersion {
    pub major: u64,
    pub minor: u64,
}

impl MinorVersion {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }
}

impl Display for MinorVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}
