//! Host adapters for code hosting platforms (GitHub, GitLab, BitBucket).

/// BitBucket Cloud 2.0 API adapter.
pub mod bitbucket;
/// GitHub REST v3 adapter.
pub mod github;
/// GitLab REST v4 adapter.
pub mod gitlab;
/// Shared traits and types for host adapters.
pub mod traits;

use std::collections::HashMap;
use std::fmt;

use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::debug;

pub use bitbucket::BitbucketResolver;
pub use github::GithubResolver;
pub use gitlab::GitlabResolver;
pub use traits::{HostResolver, RepositoryMetadata, Resolution, ResolvedRelease};

use crate::date::{timestamp_version, translate_date};
use crate::error::{ParseError, ResolveError};
use crate::io::fetch::Fetcher;
use crate::io::paginate::{PageWalker, Pagination};
use crate::version::{SortOrder, VersionInfo, ordered_versions};

/// File names recognized as a readme, lowercase.
pub const README_FILENAMES: &[&str] = &[
    "readme",
    "readme.txt",
    "readme.md",
    "readme.mkd",
    "readme.mdown",
    "readme.markdown",
    "readme.textile",
    "readme.creole",
    "readme.rst",
];

/// Placeholder used when a host has no description for a repository.
pub const NO_DESCRIPTION: &str = "No description provided";

/// API base URLs for the built-in hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoints {
    pub github_api: String,
    pub gitlab_api: String,
    pub bitbucket_api: String,
}

impl Default for HostEndpoints {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".to_string(),
            gitlab_api: "https://gitlab.com/api/v4".to_string(),
            bitbucket_api: "https://api.bitbucket.org/2.0".to_string(),
        }
    }
}

/// Resolvers tried in registration order; the first one that recognizes a
/// URL handles it.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn HostResolver>>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.resolvers.iter().map(|r| r.key()).collect();
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &keys)
            .finish()
    }
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// GitHub, GitLab and BitBucket, in that order, each with its own fetcher
    /// so credentials never leak across hosts.
    pub fn with_defaults(
        endpoints: &HostEndpoints,
        github: Fetcher,
        gitlab: Fetcher,
        bitbucket: Fetcher,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GithubResolver::new(github, &endpoints.github_api)));
        registry.register(Box::new(GitlabResolver::new(gitlab, &endpoints.gitlab_api)));
        registry.register(Box::new(BitbucketResolver::new(
            bitbucket,
            &endpoints.bitbucket_api,
        )));
        registry
    }

    /// Append a resolver with the lowest priority so far.
    pub fn register(&mut self, resolver: Box<dyn HostResolver>) {
        self.resolvers.push(resolver);
    }

    /// First resolver recognizing `url`.
    pub fn find(&self, url: &str) -> Option<&dyn HostResolver> {
        self.resolvers
            .iter()
            .find(|r| r.matches_repository_url(url))
            .map(Box::as_ref)
    }

    pub async fn resolve_releases(
        &self,
        url: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        match self.find(url) {
            Some(resolver) => {
                debug!(url, host = resolver.key(), "resolving releases");
                resolver.resolve_releases(url, tag_prefix).await
            }
            None => Ok(Resolution::NotRecognized),
        }
    }

    pub async fn resolve_repository_metadata(
        &self,
        url: &str,
    ) -> Result<Option<RepositoryMetadata>, ResolveError> {
        match self.find(url) {
            Some(resolver) => {
                debug!(url, host = resolver.key(), "resolving metadata");
                resolver.resolve_repository_metadata(url).await
            }
            None => Ok(None),
        }
    }
}

/// What part of a repository a URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RepoTarget {
    /// The repository itself, meaning its default branch.
    Default,
    Branch(String),
    /// The tag listing, meaning one release per version tag.
    Tags,
}

/// A repository URL split into `user/repo` and what it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepoRef {
    pub(crate) user: String,
    pub(crate) repo: String,
    pub(crate) target: RepoTarget,
}

impl RepoRef {
    pub(crate) fn user_repo(&self) -> String {
        format!("{}/{}", self.user, self.repo)
    }
}

/// Non-empty path segments and the fragment of an `http(s)` URL on `host`.
///
/// URLs carrying a query string are rejected.
pub(crate) fn url_parts(url: &str, host: &str) -> Option<(Vec<String>, Option<String>)> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str() != Some(host) {
        return None;
    }
    if parsed.query().is_some() {
        return None;
    }
    let segments = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Some((segments, parsed.fragment().map(str::to_string)))
}

/// The first entry of a listing that is a readme, compared
/// case-insensitively against `README_FILENAMES`.
pub(crate) fn pick_readme<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().find(|name| {
        let lower = name.to_ascii_lowercase();
        README_FILENAMES.contains(&lower.as_str())
    })
}

/// Walk a directory listing page by page and return the name of the readme
/// from the first page that has one.
pub(crate) async fn find_readme(
    fetcher: &Fetcher,
    listing_url: String,
    style: Pagination,
    name_field: &str,
) -> Result<Option<String>, ResolveError> {
    let mut walker = PageWalker::new(fetcher, listing_url, style);
    while let Some(page) = walker.next_page().await? {
        let names = page
            .iter()
            .filter_map(|entry| entry.get(name_field).and_then(Value::as_str));
        if let Some(name) = pick_readme(names) {
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}

/// Order `(tag, data)` pairs newest first, dropping tags that are not
/// versions and duplicate versions.
pub(crate) fn select_tags<T>(
    tags: Vec<(String, T)>,
    tag_prefix: Option<&str>,
) -> Vec<(VersionInfo, T)> {
    let versions = ordered_versions(tags.iter().map(|(tag, _)| tag), tag_prefix, SortOrder::Descending);

    let mut by_tag: HashMap<String, T> = HashMap::with_capacity(tags.len());
    for (tag, data) in tags {
        by_tag.entry(tag).or_insert(data);
    }

    versions
        .into_iter()
        .filter_map(|info| by_tag.remove(&info.tag()).map(|data| (info, data)))
        .collect()
}

/// Host timestamp to canonical form, blaming `url` when it does not parse.
pub(crate) fn canonical_date(url: &str, iso: &str) -> Result<String, ParseError> {
    translate_date(iso).map_err(|e| ParseError::new(url, format!("invalid timestamp {iso:?}: {e}")))
}

/// `url` with a `ref` query parameter naming `branch`, form-encoded.
pub(crate) fn with_ref(url: &str, branch: &str) -> Result<String, ParseError> {
    let mut parsed = Url::parse(url).map_err(|e| ParseError::new(url, e))?;
    parsed.query_pairs_mut().append_pair("ref", branch);
    Ok(parsed.into())
}

/// Single snapshot release of a branch head.
pub(crate) fn branch_release(timestamp: String, download_url: String) -> Resolution {
    Resolution::Found(vec![ResolvedRelease {
        version: timestamp_version(&timestamp),
        url: download_url,
        date: timestamp,
    }])
}

/// HTTP 409 is how hosts report a repository without any commits.
pub(crate) fn is_empty_repository(err: &ResolveError) -> bool {
    err.status() == Some(StatusCode::CONFLICT)
}

pub(crate) fn description_or_default(description: Option<String>) -> String {
    description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string())
}

pub(crate) fn homepage_or(homepage: Option<String>, url: &str) -> String {
    homepage
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| url.to_string())
}
