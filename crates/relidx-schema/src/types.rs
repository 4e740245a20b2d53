//! Release entries and the package payload merged into the index.

use serde::{Deserialize, Serialize};

use crate::{ALL_PLATFORMS, DEFAULT_SUBLIME_TEXT_RANGE};

/// Platforms a release applies to.
///
/// Index files in the wild carry either a single key (`"*"`,
/// `"windows-x64"`) or a list of keys, so both shapes round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Platforms {
    /// A single platform key or the wildcard `"*"`.
    One(String),
    /// Several platform keys.
    Many(Vec<String>),
}

impl Default for Platforms {
    fn default() -> Self {
        Self::One(ALL_PLATFORMS.to_string())
    }
}

impl Platforms {
    /// Whether this is the `"*"` wildcard.
    pub fn is_any(&self) -> bool {
        matches!(self, Self::One(key) if key == ALL_PLATFORMS)
    }
}

/// One downloadable release of a package, as written into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    /// Host-normalized version string (e.g. `1.2.0` or `2020.09.19.23.58.45`).
    pub version: String,

    /// Download location of the release archive.
    pub url: String,

    /// Canonical timestamp, `YYYY-MM-DD HH:MM:SS` in UTC.
    pub date: String,

    /// Platforms this release can be installed on.
    #[serde(default)]
    pub platforms: Platforms,

    /// Compatible Sublime Text build range (e.g. `>=3154`).
    #[serde(default = "default_sublime_text")]
    pub sublime_text: String,
}

fn default_sublime_text() -> String {
    DEFAULT_SUBLIME_TEXT_RANGE.to_string()
}

/// Normalized package data handed to the index merger.
///
/// `name` is the record key; every other field replaces the stored record's
/// non-key fields wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePayload {
    /// Package name, the sort key of the index.
    pub name: String,

    /// Homepage URL of the package.
    pub details: String,

    /// Releases in the order produced by the resolver or translator.
    pub releases: Vec<ReleaseEntry>,
}
