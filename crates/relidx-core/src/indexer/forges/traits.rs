use async_trait::async_trait;
use relidx_schema::{Platforms, ReleaseEntry};
use serde::Serialize;

use crate::error::ResolveError;

/// A release produced by a host resolver, before platform and compatibility
/// data are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub version: String,
    /// Download URL of the source archive for this release.
    pub url: String,
    /// Canonical timestamp (see [`crate::date::translate_date`]).
    pub date: String,
}

impl ResolvedRelease {
    pub fn into_entry(self, platforms: Platforms, sublime_text: &str) -> ReleaseEntry {
        ReleaseEntry {
            version: self.version,
            url: self.url,
            date: self.date,
            platforms,
            sublime_text: sublime_text.to_string(),
        }
    }
}

/// Outcome of asking a resolver for the releases of a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// At least one release, newest first for tag listings.
    Found(Vec<ResolvedRelease>),
    /// The URL is recognized but has nothing to release: no matching tags,
    /// or a branch that does not exist.
    EmptyBranch,
    /// The URL is not one this resolver handles.
    NotRecognized,
}

/// Descriptive data about a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub description: String,
    /// Project homepage, falling back to the repository URL.
    pub homepage: String,
    pub author: Option<String>,
    /// Raw URL of the readme on the default branch, if one was found.
    pub readme: Option<String>,
    /// Issue tracker URL, when the host has issues enabled.
    pub issues: Option<String>,
    pub donate: Option<String>,
}

/// A code host that can turn repository URLs into releases and metadata
/// (e.g. GitHub, GitLab, BitBucket).
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Short identifier for this host (e.g. "github").
    fn key(&self) -> &'static str;

    /// Whether `url` is a repository, branch or tags URL on this host.
    fn matches_repository_url(&self, url: &str) -> bool;

    /// Resolve the releases behind `url`.
    ///
    /// A tags URL yields one release per matching tag, newest first. A
    /// repository or branch URL yields a single snapshot release of the
    /// branch head, versioned by its commit timestamp.
    async fn resolve_releases(
        &self,
        url: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Resolution, ResolveError>;

    /// Fetch descriptive metadata, or `None` if `url` is not handled here.
    async fn resolve_repository_metadata(
        &self,
        url: &str,
    ) -> Result<Option<RepositoryMetadata>, ResolveError>;
}
