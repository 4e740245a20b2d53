use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use relidx_core::indexer::{PackageSource, ReleaseDefaults, SyncOutcome, sync_packages};
use relidx_core::io::cache::ResponseCache;
use relidx_core::io::fetch::build_client;
use relidx_core::{Fetcher, HostEndpoints, ResolverRegistry, RetryPolicy};
use relidx_schema::RepositoryIndex;
use tempfile::TempDir;

/// Test context with a mock GitHub API and a seeded index file.
struct TestContext {
    server: ServerGuard,
    temp_dir: TempDir,
}

impl TestContext {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        std::fs::write(
            temp_dir.path().join("repository.json"),
            r#"{
                "schema_version": "3.0.0",
                "packages": [
                    {"name": "Alpha", "details": "https://github.com/a/alpha", "releases": [], "labels": ["x"]},
                    {"name": "Omega", "details": "https://github.com/o/omega", "releases": []}
                ]
            }"#,
        )
        .expect("failed to seed index");

        Self {
            server: Server::new_async().await,
            temp_dir,
        }
    }

    fn registry(&self) -> ResolverRegistry {
        let client = build_client(Duration::from_secs(5)).unwrap();
        let cache = Arc::new(ResponseCache::new());
        let fetcher = Fetcher::new(client)
            .with_cache(cache)
            .with_policy(RetryPolicy {
                max_retries: 0,
                backoff: Duration::ZERO,
                max_rate_limit_wait: Duration::ZERO,
            });
        let endpoints = HostEndpoints {
            github_api: self.server.url(),
            ..HostEndpoints::default()
        };
        ResolverRegistry::with_defaults(&endpoints, fetcher.clone(), fetcher.clone(), fetcher)
    }

    async fn mock_github_repo(&mut self) {
        self.server
            .mock("GET", "/repos/m/middle")
            .with_status(200)
            .with_body(
                r#"{"name": "Middle", "description": "A package", "homepage": "https://middle.example",
                    "owner": {"login": "m"}, "has_issues": true, "default_branch": "main"}"#,
            )
            .create_async()
            .await;
        self.server
            .mock("GET", "/repos/m/middle/contents?ref=main")
            .with_status(200)
            .with_body(r#"[{"name": "README.md"}]"#)
            .create_async()
            .await;
        self.server
            .mock("GET", "/repos/m/middle/tags")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"name": "v2.0.0", "commit": {"sha": "b2"}},
                    {"name": "v1.0.0", "commit": {"sha": "b1"}}]"#,
            )
            .create_async()
            .await;
        for (sha, date) in [("b2", "2021-02-02T02:02:02Z"), ("b1", "2021-01-01T01:01:01Z")] {
            self.server
                .mock("GET", format!("/repos/m/middle/commits/{sha}").as_str())
                .with_status(200)
                .with_body(format!(r#"{{"commit": {{"committer": {{"date": "{date}"}}}}}}"#))
                .create_async()
                .await;
        }
        self.server
            .mock("GET", "/repos/o/omega")
            .with_status(500)
            .create_async()
            .await;
    }
}

#[tokio::test]
async fn test_resolve_merge_save() {
    let mut ctx = TestContext::new().await;
    ctx.mock_github_repo().await;
    let path = ctx.temp_dir.path().join("repository.json");

    let mut index = RepositoryIndex::load(&path).unwrap();
    let sources = vec![
        PackageSource::new("https://github.com/m/middle/tags"),
        PackageSource::new("https://github.com/o/omega"),
        PackageSource::new("https://example.com/not/a/host"),
    ];
    let reports = sync_packages(&ctx.registry(), &mut index, &sources, &ReleaseDefaults::default()).await;

    assert_eq!(
        reports[0].result.as_ref().unwrap(),
        &SyncOutcome::Created("Middle".into())
    );
    let err = reports[1].result.as_ref().unwrap_err();
    assert_eq!(err.package, "https://github.com/o/omega");
    assert_eq!(
        reports[2].result.as_ref().unwrap(),
        &SyncOutcome::NotRecognized
    );

    index.save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.ends_with("}\n"));
    assert!(text.contains("\t\"packages\": ["));

    let reloaded = RepositoryIndex::load(&path).unwrap();
    let names: Vec<&str> = reloaded.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Middle", "Omega"]);
    assert_eq!(reloaded.extra["schema_version"], "3.0.0");
    assert_eq!(reloaded.find("Alpha").unwrap().fields["labels"][0], "x");

    let middle = reloaded.find("Middle").unwrap();
    assert_eq!(middle.details(), Some("https://middle.example"));
    let releases = middle.releases().unwrap();
    let versions: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, vec!["2.0.0", "1.0.0"]);
    assert_eq!(releases[0].url, "https://codeload.github.com/m/middle/zip/v2.0.0");
    assert_eq!(releases[0].date, "2021-02-02 02:02:02");
    assert_eq!(releases[1].sublime_text, ">=3154");
}

#[tokio::test]
async fn test_second_sync_is_idempotent() {
    let mut ctx = TestContext::new().await;
    ctx.mock_github_repo().await;
    let path = ctx.temp_dir.path().join("repository.json");
    let registry = ctx.registry();
    let sources = vec![PackageSource::new("https://github.com/m/middle/tags")];

    let mut index = RepositoryIndex::load(&path).unwrap();
    sync_packages(&registry, &mut index, &sources, &ReleaseDefaults::default()).await;
    let first = index.to_json_string().unwrap();

    let reports = sync_packages(&registry, &mut index, &sources, &ReleaseDefaults::default()).await;
    assert_eq!(
        reports[0].result.as_ref().unwrap(),
        &SyncOutcome::Updated("Middle".into())
    );
    assert_eq!(index.to_json_string().unwrap(), first);
}
