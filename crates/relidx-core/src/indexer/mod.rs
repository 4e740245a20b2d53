//! Package resolution and index sync.
//!
//! A package is resolved as a unit: metadata first (for the name and
//! homepage), then releases. The index is only touched once both succeeded,
//! so a failing package never leaves a half-updated record behind.

/// Host adapters for code hosting platforms.
pub mod forges;

use relidx_schema::{DEFAULT_SUBLIME_TEXT_RANGE, PackagePayload, Platforms, RepositoryIndex};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ResolveError;
use forges::{Resolution, ResolverRegistry};

/// A repository to pull into the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    /// Repository, branch or tags URL.
    pub url: String,
    /// Package name to use instead of the repository name.
    pub name: Option<String>,
    /// Only consider tags starting with this prefix.
    pub tag_prefix: Option<String>,
}

impl PackageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            tag_prefix: None,
        }
    }
}

/// Fields every resolved release receives, since hosts do not report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDefaults {
    pub platforms: Platforms,
    pub sublime_text: String,
}

impl Default for ReleaseDefaults {
    fn default() -> Self {
        Self {
            platforms: Platforms::default(),
            sublime_text: DEFAULT_SUBLIME_TEXT_RANGE.to_string(),
        }
    }
}

/// Result of resolving one package, before anything is merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageResolution {
    Ready(PackagePayload),
    /// The repository exists but has nothing to release.
    NoReleases { name: String },
    /// No registered host handles the URL.
    NotRecognized,
}

/// What syncing one package did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created(String),
    Updated(String),
    NoReleases(String),
    NotRecognized,
}

/// A resolution failure attributed to a package.
#[derive(Error, Debug)]
#[error("{package}: {source}")]
pub struct PackageError {
    /// Package name, or the URL when the name was not known yet.
    pub package: String,
    #[source]
    pub source: ResolveError,
}

/// Per-package result of [`sync_packages`].
#[derive(Debug)]
pub struct SyncReport {
    pub url: String,
    pub result: Result<SyncOutcome, PackageError>,
}

/// Resolve metadata and releases for `source` into a payload.
///
/// # Errors
///
/// Returns a [`PackageError`] naming the package if any host request fails
/// or returns data that cannot be interpreted.
pub async fn resolve_package(
    registry: &ResolverRegistry,
    source: &PackageSource,
    defaults: &ReleaseDefaults,
) -> Result<PackageResolution, PackageError> {
    let fallback_name = source.name.clone().unwrap_or_else(|| source.url.clone());

    let metadata = registry
        .resolve_repository_metadata(&source.url)
        .await
        .map_err(|source| PackageError {
            package: fallback_name,
            source,
        })?;
    let Some(metadata) = metadata else {
        return Ok(PackageResolution::NotRecognized);
    };

    let name = source.name.clone().unwrap_or(metadata.name);
    let resolution = registry
        .resolve_releases(&source.url, source.tag_prefix.as_deref())
        .await
        .map_err(|e| PackageError {
            package: name.clone(),
            source: e,
        })?;

    Ok(match resolution {
        Resolution::Found(releases) => PackageResolution::Ready(PackagePayload {
            name,
            details: metadata.homepage,
            releases: releases
                .into_iter()
                .map(|r| r.into_entry(defaults.platforms.clone(), &defaults.sublime_text))
                .collect(),
        }),
        Resolution::EmptyBranch => PackageResolution::NoReleases { name },
        Resolution::NotRecognized => PackageResolution::NotRecognized,
    })
}

/// Resolve one package and merge it into `index`.
///
/// # Errors
///
/// Returns a [`PackageError`] if resolution fails; `index` is unchanged.
pub async fn sync_package(
    registry: &ResolverRegistry,
    index: &mut RepositoryIndex,
    source: &PackageSource,
    defaults: &ReleaseDefaults,
) -> Result<SyncOutcome, PackageError> {
    let outcome = match resolve_package(registry, source, defaults).await? {
        PackageResolution::Ready(payload) => {
            let name = payload.name.clone();
            let count = payload.releases.len();
            if index.upsert(payload) {
                info!(package = %name, releases = count, "added package");
                SyncOutcome::Created(name)
            } else {
                info!(package = %name, releases = count, "updated package");
                SyncOutcome::Updated(name)
            }
        }
        PackageResolution::NoReleases { name } => {
            warn!(package = %name, url = %source.url, "no releases found, skipping");
            SyncOutcome::NoReleases(name)
        }
        PackageResolution::NotRecognized => {
            warn!(url = %source.url, "no host recognizes this URL, skipping");
            SyncOutcome::NotRecognized
        }
    };
    Ok(outcome)
}

/// Sync every source in turn. Failures are reported per package and do not
/// stop the run.
pub async fn sync_packages(
    registry: &ResolverRegistry,
    index: &mut RepositoryIndex,
    sources: &[PackageSource],
    defaults: &ReleaseDefaults,
) -> Vec<SyncReport> {
    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        let result = sync_package(registry, index, source, defaults).await;
        if let Err(e) = &result {
            warn!(error = %e, "package failed");
        }
        reports.push(SyncReport {
            url: source.url.clone(),
            result,
        });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fetch::FetchError;
    use async_trait::async_trait;
    use forges::{HostResolver, RepositoryMetadata, ResolvedRelease};
    use reqwest::StatusCode;
    use serde_json::json;

    /// Host serving `https://fake.example/{name}` from canned answers.
    struct FakeHost;

    fn repo_name(url: &str) -> &str {
        url.trim_start_matches("https://fake.example/")
    }

    #[async_trait]
    impl HostResolver for FakeHost {
        fn key(&self) -> &'static str {
            "fake"
        }

        fn matches_repository_url(&self, url: &str) -> bool {
            url.starts_with("https://fake.example/")
        }

        async fn resolve_releases(
            &self,
            url: &str,
            _tag_prefix: Option<&str>,
        ) -> Result<Resolution, ResolveError> {
            match repo_name(url) {
                "empty" => Ok(Resolution::EmptyBranch),
                "broken-releases" => Err(FetchError::Status {
                    url: url.to_string(),
                    status: StatusCode::NOT_FOUND,
                }
                .into()),
                name => Ok(Resolution::Found(vec![ResolvedRelease {
                    version: "1.0.0".into(),
                    url: format!("https://fake.example/{name}/1.0.0.zip"),
                    date: "2020-09-19 23:58:45".into(),
                }])),
            }
        }

        async fn resolve_repository_metadata(
            &self,
            url: &str,
        ) -> Result<Option<RepositoryMetadata>, ResolveError> {
            if repo_name(url) == "broken-meta" {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }
                .into());
            }
            Ok(Some(RepositoryMetadata {
                name: repo_name(url).to_string(),
                description: "desc".into(),
                homepage: url.to_string(),
                author: None,
                readme: None,
                issues: None,
                donate: None,
            }))
        }
    }

    fn registry() -> ResolverRegistry {
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(FakeHost));
        registry
    }

    fn index_with(names: &[&str]) -> RepositoryIndex {
        let mut index = RepositoryIndex::new();
        for name in names {
            index.upsert(PackagePayload {
                name: (*name).to_string(),
                details: format!("https://fake.example/{name}"),
                releases: Vec::new(),
            });
        }
        index
    }

    fn names(index: &RepositoryIndex) -> Vec<&str> {
        index.packages.iter().map(|p| p.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_resolve_builds_payload() {
        let source = PackageSource {
            tag_prefix: Some("v".into()),
            ..PackageSource::new("https://fake.example/Alpha")
        };
        let defaults = ReleaseDefaults {
            sublime_text: ">=4070".into(),
            ..ReleaseDefaults::default()
        };

        let PackageResolution::Ready(payload) = resolve_package(&registry(), &source, &defaults)
            .await
            .unwrap()
        else {
            panic!("expected a payload");
        };
        assert_eq!(payload.name, "Alpha");
        assert_eq!(payload.details, "https://fake.example/Alpha");
        assert_eq!(payload.releases.len(), 1);
        assert_eq!(payload.releases[0].sublime_text, ">=4070");
        assert!(payload.releases[0].platforms.is_any());
    }

    #[tokio::test]
    async fn test_name_override() {
        let source = PackageSource {
            name: Some("Renamed".into()),
            ..PackageSource::new("https://fake.example/repo")
        };
        let mut index = RepositoryIndex::new();
        let outcome = sync_package(&registry(), &mut index, &source, &ReleaseDefaults::default())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Created("Renamed".into()));
        assert!(index.find("Renamed").is_some());
    }

    #[tokio::test]
    async fn test_sync_creates_in_order_then_updates() {
        let registry = registry();
        let defaults = ReleaseDefaults::default();
        let mut index = index_with(&["Alpha", "Gamma"]);

        let outcome = sync_package(
            &registry,
            &mut index,
            &PackageSource::new("https://fake.example/Beta"),
            &defaults,
        )
        .await
        .unwrap();
        assert_eq!(outcome, SyncOutcome::Created("Beta".into()));
        assert_eq!(names(&index), vec!["Alpha", "Beta", "Gamma"]);

        let outcome = sync_package(
            &registry,
            &mut index,
            &PackageSource::new("https://fake.example/Gamma"),
            &defaults,
        )
        .await
        .unwrap();
        assert_eq!(outcome, SyncOutcome::Updated("Gamma".into()));
        assert_eq!(
            index.find("Gamma").unwrap().fields["releases"][0]["version"],
            json!("1.0.0")
        );
        assert!(index.is_sorted());
    }

    #[tokio::test]
    async fn test_failures_leave_index_untouched() {
        let registry = registry();
        let defaults = ReleaseDefaults::default();
        let mut index = index_with(&["broken-releases"]);
        let before = index.clone();

        let err = sync_package(
            &registry,
            &mut index,
            &PackageSource::new("https://fake.example/broken-releases"),
            &defaults,
        )
        .await
        .unwrap_err();
        assert_eq!(err.package, "broken-releases");
        assert_eq!(err.source.status(), Some(StatusCode::NOT_FOUND));

        let err = sync_package(
            &registry,
            &mut index,
            &PackageSource::new("https://fake.example/broken-meta"),
            &defaults,
        )
        .await
        .unwrap_err();
        assert_eq!(err.package, "https://fake.example/broken-meta");
        assert!(err.to_string().starts_with("https://fake.example/broken-meta: "));

        assert_eq!(index, before);
    }

    #[tokio::test]
    async fn test_sync_packages_reports_each() {
        let registry = registry();
        let mut index = RepositoryIndex::new();
        let sources = vec![
            PackageSource::new("https://fake.example/broken-meta"),
            PackageSource::new("https://fake.example/empty"),
            PackageSource::new("https://elsewhere.example/u/r"),
            PackageSource::new("https://fake.example/Zeta"),
        ];

        let reports = sync_packages(&registry, &mut index, &sources, &ReleaseDefaults::default()).await;

        assert_eq!(reports.len(), 4);
        assert!(reports[0].result.is_err());
        assert_eq!(
            reports[1].result.as_ref().unwrap(),
            &SyncOutcome::NoReleases("empty".into())
        );
        assert_eq!(reports[2].result.as_ref().unwrap(), &SyncOutcome::NotRecognized);
        assert_eq!(
            reports[3].result.as_ref().unwrap(),
            &SyncOutcome::Created("Zeta".into())
        );
        assert_eq!(names(&index), vec!["Zeta"]);
    }
}
