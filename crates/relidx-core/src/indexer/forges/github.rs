use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::traits::{HostResolver, RepositoryMetadata, Resolution, ResolvedRelease};
use super::{
    RepoRef, RepoTarget, branch_release, canonical_date, description_or_default, find_readme,
    homepage_or, is_empty_repository, select_tags, url_parts, with_ref,
};
use crate::error::{ResolveError, decode};
use crate::io::fetch::Fetcher;
use crate::io::paginate::{PageWalker, Pagination};

const HOST: &str = "github.com";
const PER_PAGE: usize = 100;

#[derive(Deserialize)]
struct RepositoryInfo {
    name: String,
    description: Option<String>,
    homepage: Option<String>,
    owner: Owner,
    #[serde(default)]
    has_issues: bool,
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct Owner {
    login: String,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

/// `/commits/{sha}` and the `commit` object of `/branches/{branch}`.
#[derive(Deserialize)]
struct Commit {
    commit: GitCommit,
}

#[derive(Deserialize)]
struct GitCommit {
    committer: Signature,
}

#[derive(Deserialize)]
struct Signature {
    date: String,
}

#[derive(Deserialize)]
struct Branch {
    commit: Commit,
}

/// Resolves `https://github.com/{user}/{repo}` URLs, with optional
/// `/tree/{branch}` or `/tags` suffixes.
#[derive(Debug, Clone)]
pub struct GithubResolver {
    fetcher: Fetcher,
    api_base: String,
}

impl GithubResolver {
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
            [user, repo, tags] if tags == "tags" => (user, repo, RepoTarget::Tags),
            [user, repo, tree, branch] if tree == "tree" => {
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

    fn api_url(&self, user_repo: &str, suffix: &str) -> String {
        format!("{}/repos/{user_repo}{suffix}", self.api_base)
    }

    fn download_url(user_repo: &str, reference: &str) -> String {
        format!("https://codeload.github.com/{user_repo}/zip/{reference}")
    }

    async fn repository_info(
        &self,
        user_repo: &str,
        prefer_cache: bool,
    ) -> Result<RepositoryInfo, ResolveError> {
        let url = self.api_url(user_repo, "");
        let body = self.fetcher.fetch_json(&url, prefer_cache).await?;
        Ok(decode(&url, body)?)
    }

    async fn commit_date(&self, user_repo: &str, sha: &str) -> Result<String, ResolveError> {
        let url = self.api_url(user_repo, &format!("/commits/{sha}"));
        let body = self.fetcher.fetch_json(&url, true).await?;
        let commit: Commit = decode(&url, body)?;
        Ok(canonical_date(&url, &commit.commit.committer.date)?)
    }

    async fn resolve_tags(
        &self,
        user_repo: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let tags_url = self.api_url(user_repo, "/tags");
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
            .map(|item| decode::<Tag>(&tags_url, item).map(|t| (t.name, t.commit.sha)))
            .collect::<Result<Vec<_>, _>>()?;

        let selected = select_tags(tags, tag_prefix);
        if selected.is_empty() {
            debug!(user_repo, "no version tags");
            return Ok(Resolution::EmptyBranch);
        }

        // The tag listing has no dates, so each surviving tag costs one
        // commit lookup.
        let mut releases = Vec::with_capacity(selected.len());
        for (info, sha) in selected {
            let date = self.commit_date(user_repo, &sha).await?;
            releases.push(ResolvedRelease {
                url: Self::download_url(user_repo, &info.tag()),
                date,
                version: info.version,
            });
        }
        Ok(Resolution::Found(releases))
    }
}

#[async_trait]
impl HostResolver for GithubResolver {
    fn key(&self) -> &'static str {
        "github"
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
        let user_repo = repo.user_repo();

        let branch = match repo.target {
            RepoTarget::Tags => return self.resolve_tags(&user_repo, tag_prefix).await,
            RepoTarget::Branch(branch) => branch,
            RepoTarget::Default => {
                let info = self.repository_info(&user_repo, true).await?;
                let Some(branch) = info.default_branch else {
                    return Ok(Resolution::EmptyBranch);
                };
                branch
            }
        };

        let branch_url = self.api_url(&user_repo, &format!("/branches/{branch}"));
        let body = match self.fetcher.fetch_json(&branch_url, false).await {
            Ok(body) => body,
            Err(e) => {
                let e = ResolveError::from(e);
                if is_empty_repository(&e) {
                    debug!(%user_repo, %branch, "repository is empty");
                    return Ok(Resolution::EmptyBranch);
                }
                return Err(e);
            }
        };
        let head: Branch = decode(&branch_url, body)?;
        let timestamp = canonical_date(&branch_url, &head.commit.commit.committer.date)?;

        Ok(branch_release(
            timestamp,
            Self::download_url(&user_repo, &branch),
        ))
    }

    async fn resolve_repository_metadata(
        &self,
        url: &str,
    ) -> Result<Option<RepositoryMetadata>, ResolveError> {
        let Some(repo) = Self::parse_url(url) else {
            return Ok(None);
        };
        let user_repo = repo.user_repo();
        let info = self.repository_info(&user_repo, false).await?;

        let branch = match repo.target {
            RepoTarget::Branch(branch) => Some(branch),
            RepoTarget::Default | RepoTarget::Tags => info.default_branch,
        };

        let readme = match branch {
            Some(branch) => {
                // The contents endpoint returns the whole directory at once.
                let listing = with_ref(&self.api_url(&user_repo, "/contents"), &branch)?;
                find_readme(&self.fetcher, listing, Pagination::Single, "name")
                    .await?
                    .map(|name| {
                        format!("https://raw.githubusercontent.com/{user_repo}/{branch}/{name}")
                    })
            }
            None => None,
        };

        Ok(Some(RepositoryMetadata {
            name: info.name,
            description: description_or_default(info.description),
            homepage: homepage_or(info.homepage, url),
            author: Some(info.owner.login),
            readme,
            issues: info
                .has_issues
                .then(|| format!("https://github.com/{user_repo}/issues")),
            donate: None,
        }))
    }
}
