//! Tag normalization and ordering.
//!
//! Turns arbitrary tag names into an ordered, duplicate-free list of
//! versions:
//!
//! 1. Tags not carrying the required prefix are dropped, and the prefix (plus
//!    a `v` decoration right after it) is stripped and remembered.
//! 2. Whatever is left must look like `N(.N)*`, optionally followed by a
//!    semver pre-release (`-rc.1`) and/or build (`+build.5`) suffix. Anything
//!    else is silently ignored.
//! 3. Versions are ordered by their numeric segments (a missing segment is
//!    lower than a present one, so `1.0 < 1.0.0`), then pre-release < plain <
//!    build, then by semver precedence of the suffix.
//! 4. Duplicates of a normalized version are dropped, keeping the first after
//!    a stable sort.

use std::cmp::Ordering;

use semver::{BuildMetadata, Prerelease};

/// Sort direction for [`sort_versions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    /// Newest first; what release resolution uses.
    Descending,
}

/// A tag that parsed as a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Text stripped from the front of the tag (e.g. `v`, `release-v`).
    pub prefix: String,
    /// The normalized version (e.g. `1.2.0`).
    pub version: String,
    key: VersionKey,
}

impl VersionInfo {
    /// The original tag name.
    pub fn tag(&self) -> String {
        format!("{}{}", self.prefix, self.version)
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionKey {
    segments: Vec<u64>,
    pre: Prerelease,
    build: BuildMetadata,
}

impl VersionKey {
    /// 0 = pre-release, 1 = plain, 2 = build metadata only.
    fn rank(&self) -> u8 {
        if !self.pre.is_empty() {
            0
        } else if self.build.is_empty() {
            1
        } else {
            2
        }
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments
            .cmp(&other.segments)
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| self.pre.cmp(&other.pre))
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_key(text: &str) -> Option<VersionKey> {
    let (rest, build) = match text.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (text, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let segments = core
        .split('.')
        .map(|s| {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<u64>().ok()
        })
        .collect::<Option<Vec<_>>>()?;

    let pre = match pre {
        Some("") => return None,
        Some(p) => Prerelease::new(p).ok()?,
        None => Prerelease::EMPTY,
    };
    let build = match build {
        Some("") => return None,
        Some(b) => BuildMetadata::new(b).ok()?,
        None => BuildMetadata::EMPTY,
    };

    Some(VersionKey {
        segments,
        pre,
        build,
    })
}

/// Parse a single tag, or `None` if it is filtered out.
///
/// Without `tag_prefix` a single leading `v` is stripped. With it, tags not
/// starting with the prefix are rejected, and a `v` directly after the prefix
/// is stripped as well.
pub fn parse_tag(tag: &str, tag_prefix: Option<&str>) -> Option<VersionInfo> {
    let (filter, rest) = match tag_prefix {
        Some(prefix) if !prefix.is_empty() => (prefix, tag.strip_prefix(prefix)?),
        _ => ("", tag),
    };
    let (decoration, candidate) = match rest.strip_prefix('v') {
        Some(stripped) => ("v", stripped),
        None => ("", rest),
    };

    let key = parse_key(candidate)?;
    Some(VersionInfo {
        prefix: format!("{filter}{decoration}"),
        version: candidate.to_string(),
        key,
    })
}

/// Keep the tags that parse as versions, in arrival order.
pub fn filter_versions<I, S>(tags: I, tag_prefix: Option<&str>) -> Vec<VersionInfo>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|tag| parse_tag(tag.as_ref(), tag_prefix))
        .collect()
}

/// Stable sort, then drop versions that compare equal to an earlier one
/// (`1.0.0` and `01.0.0`), keeping the first.
pub fn sort_versions(mut versions: Vec<VersionInfo>, order: SortOrder) -> Vec<VersionInfo> {
    match order {
        SortOrder::Ascending => versions.sort_by(|a, b| a.key.cmp(&b.key)),
        SortOrder::Descending => versions.sort_by(|a, b| b.key.cmp(&a.key)),
    }

    versions.dedup_by(|later, kept| later.key.cmp(&kept.key) == Ordering::Equal);
    versions
}

/// [`filter_versions`] followed by [`sort_versions`].
pub fn ordered_versions<I, S>(tags: I, tag_prefix: Option<&str>, order: SortOrder) -> Vec<VersionInfo>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sort_versions(filter_versions(tags, tag_prefix), order)
}
