use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::traits::{HostResolver, RepositoryMetadata, Resolution, ResolvedRelease};
use super::{
    RepoRef, RepoTarget, branch_release, canonical_date, description_or_default, find_readme,
    homepage_or, is_empty_repository, select_tags, url_parts,
};
use crate::error::{ParseError, ResolveError, decode};
use crate::io::fetch::Fetcher;
use crate::io::paginate::{PageWalker, Pagination};

const HOST: &str = "bitbucket.org";
const WEB_BASE: &str = "https://bitbucket.org";

#[derive(Deserialize)]
struct RepositoryInfo {
    name: String,
    description: Option<String>,
    website: Option<String>,
    owner: Owner,
    #[serde(default)]
    has_issues: bool,
    mainbranch: Option<NamedRef>,
}

#[derive(Deserialize)]
struct Owner {
    nickname: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

/// A tag or branch from `/refs/...`.
#[derive(Deserialize)]
struct RefInfo {
    name: String,
    target: CommitTarget,
}

#[derive(Deserialize)]
struct CommitTarget {
    date: String,
}

/// Resolves `https://bitbucket.org/{user}/{repo}` URLs:
///
/// - `.../{repo}`: head of the main branch
/// - `.../{repo}/src/{branch}`: head of `branch`
/// - `.../{repo}#tags`: one release per version tag
#[derive(Debug, Clone)]
pub struct BitbucketResolver {
    fetcher: Fetcher,
    api_base: String,
}

impl BitbucketResolver {
    pub fn new(fetcher: Fetcher, api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            fetcher,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn parse_url(url: &str) -> Option<RepoRef> {
        let (segments, fragment) = url_parts(url, HOST)?;
        let (user, repo, target) = match (segments.as_slice(), fragment.as_deref()) {
            ([user, repo], None) => (user, repo, RepoTarget::Default),
            ([user, repo], Some("tags")) => (user, repo, RepoTarget::Tags),
            ([user, repo, src, branch], None) if src == "src" => {
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
        format!("{}/repositories/{user_repo}{suffix}", self.api_base)
    }

    fn download_url(user_repo: &str, reference: &str) -> String {
        format!("{WEB_BASE}/{user_repo}/get/{reference}.zip")
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

    /// Branch named by the URL, or the main branch for repository URLs.
    async fn branch_for(&self, repo: &RepoRef) -> Result<Option<String>, ResolveError> {
        match &repo.target {
            RepoTarget::Branch(branch) => Ok(Some(branch.clone())),
            RepoTarget::Default | RepoTarget::Tags => {
                let info = self.repository_info(&repo.user_repo(), true).await?;
                Ok(info.mainbranch.map(|b| b.name))
            }
        }
    }

    async fn resolve_tags(
        &self,
        user_repo: &str,
        tag_prefix: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let tags_url = self.api_url(user_repo, "/refs/tags?pagelen=100");
        let items = match PageWalker::new(&self.fetcher, tags_url.clone(), Pagination::NextField)
            .collect_all()
            .await
        {
            Err(e) if is_empty_repository(&e) => return Ok(Resolution::EmptyBranch),
            other => other?,
        };

        let tags = items
            .into_iter()
            .map(|item| decode::<RefInfo>(&tags_url, item).map(|t| (t.name, t.target.date)))
            .collect::<Result<Vec<_>, _>>()?;

        let selected = select_tags(tags, tag_prefix);
        if selected.is_empty() {
            debug!(user_repo, "no version tags");
            return Ok(Resolution::EmptyBranch);
        }

        let releases = selected
            .into_iter()
            .map(|(info, date)| {
                Ok(ResolvedRelease {
                    url: Self::download_url(user_repo, &info.tag()),
                    date: canonical_date(&tags_url, &date)?,
                    version: info.version,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(Resolution::Found(releases))
    }
}

#[async_trait]
impl HostResolver for BitbucketResolver {
    fn key(&self) -> &'static str {
        "bitbucket"
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

        if repo.target == RepoTarget::Tags {
            return self.resolve_tags(&user_repo, tag_prefix).await;
        }

        let Some(branch) = self.branch_for(&repo).await? else {
            return Ok(Resolution::EmptyBranch);
        };

        let branch_url = self.api_url(&user_repo, &format!("/refs/branches/{branch}"));
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
        let head: RefInfo = decode(&branch_url, body)?;
        let timestamp = canonical_date(&branch_url, &head.target.date)?;

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
            RepoTarget::Default | RepoTarget::Tags => info.mainbranch.map(|b| b.name),
        };

        let readme = match branch {
            Some(branch) => {
                let listing = self.api_url(&user_repo, &format!("/src/{branch}/?pagelen=100"));
                find_readme(&self.fetcher, listing, Pagination::NextField, "path")
                    .await?
                    .map(|path| format!("{WEB_BASE}/{user_repo}/raw/{branch}/{path}"))
            }
            None => None,
        };

        Ok(Some(RepositoryMetadata {
            name: info.name,
            description: description_or_default(info.description),
            homepage: homepage_or(info.website, url),
            author: info.owner.nickname.or(info.owner.username),
            readme,
            issues: info
                .has_issues
                .then(|| format!("{WEB_BASE}/{user_repo}/issues")),
            donate: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::forges::testing::fetcher;
    use mockito::{Server, ServerGuard};

    fn resolver(server: &ServerGuard) -> BitbucketResolver {
        BitbucketResolver::new(fetcher(), server.url())
    }

    const REPO_INFO: &str = r#"{
        "name": "sublime-foo",
        "description": "",
        "website": null,
        "owner": {"nickname": "wbond", "username": null},
        "has_issues": true,
        "mainbranch": {"name": "main"}
    }"#;

    #[test]
    fn test_parse_url() {
        let repo = BitbucketResolver::parse_url("https://bitbucket.org/u/r").unwrap();
        assert_eq!(repo.user_repo(), "u/r");
        assert_eq!(repo.target, RepoTarget::Default);

        let repo = BitbucketResolver::parse_url("https://bitbucket.org/u/r/#tags").unwrap();
        assert_eq!(repo.target, RepoTarget::Tags);

        let repo = BitbucketResolver::parse_url("http://bitbucket.org/u/r/src/dev/").unwrap();
        assert_eq!(repo.target, RepoTarget::Branch("dev".into()));

        assert!(BitbucketResolver::parse_url("https://bitbucket.org/u").is_none());
        assert!(BitbucketResolver::parse_url("https://bitbucket.org/u/r#branches").is_none());
        assert!(BitbucketResolver::parse_url("https://bitbucket.org/u/r/downloads/x").is_none());
        assert!(BitbucketResolver::parse_url("https://github.com/u/r").is_none());
    }

    #[tokio::test]
    async fn test_tags_across_pages() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let _p1 = server
            .mock("GET", "/repositories/u/r/refs/tags?pagelen=100")
            .with_status(200)
            .with_body(format!(
                r#"{{"values": [
                    {{"name": "v1.0.0", "target": {{"date": "2020-01-01T10:00:00+00:00"}}}},
                    {{"name": "latest", "target": {{"date": "not a date"}}}},
                    {{"name": "v1.2.0", "target": {{"date": "2020-03-01T10:00:00+00:00"}}}}
                ], "next": "{base}/tags-2"}}"#
            ))
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", "/tags-2")
            .with_status(200)
            .with_body(
                r#"{"values": [{"name": "v1.1.0", "target": {"date": "2020-02-01T10:00:00+00:00"}}]}"#,
            )
            .create_async()
            .await;

        let resolution = resolver(&server)
            .resolve_releases("https://bitbucket.org/u/r#tags", None)
            .await
            .unwrap();

        let Resolution::Found(releases) = resolution else {
            panic!("expected releases, got {resolution:?}");
        };
        let versions: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.2.0", "1.1.0", "1.0.0"]);
        assert_eq!(releases[0].url, "https://bitbucket.org/u/r/get/v1.2.0.zip");
        assert_eq!(releases[0].date, "2020-03-01 10:00:00");
    }

    #[tokio::test]
    async fn test_tags_without_versions_is_empty() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repositories/u/r/refs/tags?pagelen=100")
            .with_status(200)
            .with_body(r#"{"values": [{"name": "nightly", "target": {"date": "2020-01-01T10:00:00+00:00"}}]}"#)
            .create_async()
            .await;

        let resolution = resolver(&server)
            .resolve_releases("https://bitbucket.org/u/r#tags", None)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::EmptyBranch);
    }

    #[tokio::test]
    async fn test_default_branch_snapshot() {
        let mut server = Server::new_async().await;
        let info = server
            .mock("GET", "/repositories/u/r")
            .with_status(200)
            .with_body(REPO_INFO)
            .expect(1)
            .create_async()
            .await;
        let _branch = server
            .mock("GET", "/repositories/u/r/refs/branches/main")
            .with_status(200)
            .with_body(r#"{"name": "main", "target": {"date": "2020-09-19T23:58:45+00:00"}}"#)
            .create_async()
            .await;

        let resolution = resolver(&server)
            .resolve_releases("https://bitbucket.org/u/r", None)
            .await
            .unwrap();

        let Resolution::Found(releases) = resolution else {
            panic!("expected one release, got {resolution:?}");
        };
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].version, "2020.09.19.23.58.45");
        assert_eq!(releases[0].date, "2020-09-19 23:58:45");
        assert_eq!(releases[0].url, "https://bitbucket.org/u/r/get/main.zip");
        info.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_repository_conflict() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repositories/u/r/refs/branches/dev")
            .with_status(409)
            .with_body(r#"{"type": "error"}"#)
            .create_async()
            .await;

        let resolution = resolver(&server)
            .resolve_releases("https://bitbucket.org/u/r/src/dev", None)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::EmptyBranch);
    }

    #[tokio::test]
    async fn test_metadata_with_readme_on_second_page() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let _info = server
            .mock("GET", "/repositories/u/r")
            .with_status(200)
            .with_body(REPO_INFO)
            .create_async()
            .await;
        let _p1 = server
            .mock("GET", "/repositories/u/r/src/main/?pagelen=100")
            .with_status(200)
            .with_body(format!(
                r#"{{"values": [{{"path": "plugin.py"}}], "next": "{base}/src-2"}}"#
            ))
            .create_async()
            .await;
        let _p2 = server
            .mock("GET", "/src-2")
            .with_status(200)
            .with_body(r#"{"values": [{"path": "README.rst"}, {"path": "Readme.md"}]}"#)
            .create_async()
            .await;

        let url = "https://bitbucket.org/u/r";
        let meta = resolver(&server)
            .resolve_repository_metadata(url)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(meta.name, "sublime-foo");
        assert_eq!(meta.description, "No description provided");
        assert_eq!(meta.homepage, url);
        assert_eq!(meta.author.as_deref(), Some("wbond"));
        assert_eq!(
            meta.readme.as_deref(),
            Some("https://bitbucket.org/u/r/raw/main/README.rst")
        );
        assert_eq!(meta.issues.as_deref(), Some("https://bitbucket.org/u/r/issues"));
        assert_eq!(meta.donate, None);
    }

    #[tokio::test]
    async fn test_metadata_without_readme() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let _info = server
            .mock("GET", "/repositories/u/r")
            .with_status(200)
            .with_body(
                r#"{"name": "r", "description": "Tools", "website": "https://r.example",
                    "owner": {"username": "someone"}, "has_issues": false,
                    "mainbranch": {"name": "main"}}"#,
            )
            .create_async()
            .await;
        let p1 = server
            .mock("GET", "/repositories/u/r/src/dev/?pagelen=100")
            .with_status(200)
            .with_body(format!(r#"{{"values": [{{"path": "a.py"}}], "next": "{base}/src-2"}}"#))
            .expect(1)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", "/src-2")
            .with_status(200)
            .with_body(r#"{"values": [{"path": "b.py"}], "next": null}"#)
            .expect(1)
            .create_async()
            .await;

        let meta = resolver(&server)
            .resolve_repository_metadata("https://bitbucket.org/u/r/src/dev")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(meta.readme, None);
        assert_eq!(meta.issues, None);
        assert_eq!(meta.description, "Tools");
        assert_eq!(meta.homepage, "https://r.example");
        assert_eq!(meta.author.as_deref(), Some("someone"));
        p1.assert_async().await;
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn test_foreign_url_is_not_recognized() {
        let resolver = BitbucketResolver::new(fetcher(), "http://127.0.0.1:9");
        assert_eq!(
            resolver
                .resolve_releases("https://gitlab.com/u/r", None)
                .await
                .unwrap(),
            Resolution::NotRecognized
        );
        assert!(
            resolver
                .resolve_repository_metadata("https://gitlab.com/u/r")
                .await
                .unwrap()
                .is_none()
        );
    }
}
