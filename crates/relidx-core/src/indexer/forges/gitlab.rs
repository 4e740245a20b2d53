use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::traits::{HostResolver, RepositoryMetadata, Resolution, ResolvedRelease};
use super::{
    RepoRef, RepoTarget, branch_release, canonical_date, description_or_default, find_readme,
    is_empty_repository, select_tags, url_parts, with_ref,
};
use crate::error::{ParseError, ResolveError, decode};
use crate::io::fetch::Fetcher;
use crate::io::paginate::{PageWalker, Pagination};

const HOST: &str = "gitlab.com";
const WEB_BASE: &str = "https://gitlab.com";
const PER_PAGE: usize = 100;

#[derive(Deserialize)]
struct Project {
    name: String,
    description: Option<String>,
    namespace: Namespace,
    #[serde(default)]
    issues_enabled: bool,
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct Namespace {
    path: String,
}

/// Entry of `/repository/tags`, also the shape of `/repository/branches/{b}`.
#[derive(Deserialize)]
struct RefInfo {
    name: String,
    commit: Commit,
}

#[derive(Deserialize)]
struct Commit {
    committed_date: String,
}

/// Resolves `https://gitlab.com/{user}/{repo}` URLs, with optional
/// `/-/tree/{branch}` or `/-/tags` suffixes.
#[derive(Debug, Clone)]
pub struct GitlabResolver {
    fetcher: Fetcher,
    api_base: String,
}

impl GitlabResolver {
    pub fn new(fetcher: Fetcher, api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            fetcher,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn parse_url(url: &str) -> Option<RepoRef> {
        let (segments, fragment) = url_parts(url, HOST)?;
        if fragment.is_some() {
            return None;
        }
        let (user, repo, target) = match segments.as_slice() {
            [user, repo] => (user, repo, RepoTarget::Default),
            [user, repo, dash, tags] if dash == "-" && tags == "tags" => {
                (user, repo, RepoTarget::Tags)
            }
            [user, repo, dash, tree, branch] if dash == "-" && tree == "tree" => {
                (user, repo, RepoTarget::Branch(branch.clone()))
            }
            _ => return None,
        };
        Some(RepoRef {
            user: user.clone(),
            repo: repo.clone(),
            target,
        })
    }

    /// Project endpoints take the URL-encoded `user/repo` path as the id.
    fn api_url(&self, repo: &RepoRef, suffix: &str) -> String {
        format!(
            "{}/projects/{}%2F{}{suffix}",
            self.api_base, repo.user, repo.repo
        )
    }

    fn download_url(repo: &RepoRef, reference: &str) -> String {
        format!(
            "{WEB_BASE}/{}/-/archive/{reference}/{}-{reference}.zip",
            repo.user_repo(),
            repo.repo
        )
    }

    async fn project(&self, repo: &RepoRef, prefer_cache: bool) -> Result<Project, ResolveError> {
        let url = self.api_url(repo, "");
        let body = self.fetcher.fetch_json(&url, prefer_cache).await?;
        Ok(decode(&url, body)?)
    }

    async fn resolve_tags(
        &self,
        repo: &RepoRef,
        tag_prefix: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let tags_url = self.api_url(repo, "/repository/tags");
        let walker = PageWalker::new(
            &self.fetcher,
            tags_url.clone(),
            Pagination::PageNumber { per_page: PER_PAGE },
        );
        let items = match walker.collect_all().await {
            Err(e) if is_empty_repository(&e) => return Ok(Resolution::EmptyBranch),
            other => other?,
        };

        let tags = items
            .into_iter()
            .map(|item| {
                decode::<RefInfo>(&tags_url, item).map(|t| (t.name, t.commit.committed_date))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let selected = select_tags(tags, tag_prefix);
        if selected.is_empty() {
            debug!(user_repo = %repo.user_repo(), "no version tags");
            return Ok(Resolution::EmptyBranch);
        }

        let releases = selected
            .into_iter()
            .map(|(info, date)| {
                Ok(ResolvedRelease {
                    url: Self::download_url(repo, &info.tag()),
                    date: canonical_date(&tags_url, &date)?,
                    version: info.version,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(Resolution::Found(releases))
    }
}

#[async_trait]
impl HostResolver for GitlabResolver {
    fn key(&self) -> &'static str {
        "gitlab"
    }

    fn matches_repository_url(&self, url: &str) -> bool {
        Self::parse_url(url).is_some()
    }

    async fn resolve_releases(
        &self,
        url: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let Some(repo) = Self::parse_url(url) else {
            return Ok(Resolution::NotRecognized);
        };

        let branch = match &repo.target {
            RepoTarget::Tags => return self.resolve_tags(&repo, tag_prefix).await,
            RepoTarget::Branch(branch) => branch.clone(),
            RepoTarget::Default => match self.project(&repo, true).await?.default_branch {
                Some(branch) => branch,
                None => return Ok(Resolution::EmptyBranch),
            },
        };

        let branch_url = self.api_url(&repo, &format!("/repository/branches/{branch}"));
        let body = match self.fetcher.fetch_json(&branch_url, false).await {
            Ok(body) => body,
            Err(e) => {
                let e = ResolveError::from(e);
                if is_empty_repository(&e) {
                    debug!(user_repo = %repo.user_repo(), %branch, "repository is empty");
                    return Ok(Resolution::EmptyBranch);
                }
                return Err(e);
            }
        };
        let head: RefInfo = decode(&branch_url, body)?;
        let timestamp = canonical_date(&branch_url, &head.commit.committed_date)?;

        Ok(branch_release(timestamp, Self::download_url(&repo, &branch)))
    }

    async fn resolve_repository_metadata(
        &self,
        url: &str,
    ) -> Result<Option<RepositoryMetadata>, ResolveError> {
        let Some(repo) = Self::parse_url(url) else {
            return Ok(None);
        };
        let user_repo = repo.user_repo();
        let project = self.project(&repo, false).await?;

        let branch = match &repo.target {
            RepoTarget::Branch(branch) => Some(branch.clone()),
            RepoTarget::Default | RepoTarget::Tags => project.default_branch,
        };

        let readme = match branch {
            Some(branch) => {
                let listing = with_ref(&self.api_url(&repo, "/repository/tree"), &branch)?;
                find_readme(
                    &self.fetcher,
                    listing,
                    Pagination::PageNumber { per_page: PER_PAGE },
                    "name",
                )
                .await?
                .map(|name| format!("{WEB_BASE}/{user_repo}/-/raw/{branch}/{name}"))
            }
            None => None,
        };

        Ok(Some(RepositoryMetadata {
            name: project.name,
            description: description_or_default(project.description),
            homepage: url.to_string(),
            author: Some(project.namespace.path),
            readme,
            issues: project
                .issues_enabled
                .then(|| format!("{WEB_BASE}/{user_repo}/-/issues")),
            donate: None,
        }))
    }
}
