//! Release command

use std::path::Path;

use anyhow::{Context, Result};
use relidx_core::release::translate_release;
use relidx_core::workflow::ReleaseOutputs;
use tracing::info;

use super::{load_index, read_event};
use crate::EventArgs;
use crate::config::Config;

/// Merge a release event into the index and print the workflow outputs.
pub fn release(repository: &Path, args: &EventArgs, config: &Config) -> Result<()> {
    let outputs = apply_release(repository, args, config)?;
    print!("{}", outputs.to_workflow_commands());
    Ok(())
}

fn apply_release(repository: &Path, args: &EventArgs, config: &Config) -> Result<ReleaseOutputs> {
    let event = read_event(args.event.as_deref())?;
    let fallback = args
        .sublime_text_version_range
        .as_deref()
        .unwrap_or(&config.release.sublime_text);
    let payload = translate_release(&event, fallback)?;

    let name = payload.name.clone();
    let details = payload.details.clone();
    let count = payload.releases.len();

    let mut index = load_index(repository)?;
    let created = index.upsert(payload);
    index
        .save(repository)
        .with_context(|| format!("Failed to write {}", repository.display()))?;

    info!(package = %name, releases = count, created, "merged release");
    Ok(ReleaseOutputs::new(
        &name,
        &details,
        event.release.body_text(),
        created,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relidx_schema::RepositoryIndex;
    use tempfile::tempdir;

    const EVENT: &str = r#"{
        "release": {
            "tag_name": "2.0.0",
            "published_at": "2022-01-02T03:04:05Z",
            "body": "Changes\nSublime-Text-Version-Range: >=4107",
            "assets": [{
                "name": "LSP-Foo_osx-arm64.zip",
                "content_type": "application/zip",
                "browser_download_url": "https://github.com/o/LSP-Foo/releases/download/2.0.0/LSP-Foo_osx-arm64.zip"
            }]
        },
        "repository": {"name": "LSP-Foo", "html_url": "https://github.com/o/LSP-Foo"}
    }"#;

    #[test]
    fn test_apply_release_creates_then_updates() {
        let dir = tempdir().unwrap();
        let repository = dir.path().join("repository.json");
        std::fs::write(
            &repository,
            r#"{"packages": [{"name": "A", "details": "https://a", "releases": []}, {"name": "Z", "details": "https://z", "releases": []}]}"#,
        )
        .unwrap();
        let event_path = dir.path().join("event.json");
        std::fs::write(&event_path, EVENT).unwrap();

        let args = EventArgs {
            event: Some(event_path),
            sublime_text_version_range: None,
        };
        let config = Config::default();

        let outputs = apply_release(&repository, &args, &config).unwrap();
        assert_eq!(outputs.pr_title, "Add LSP-Foo");
        assert!(outputs.pr_body.contains("https://github.com/o/LSP-Foo"));

        let index = RepositoryIndex::load(&repository).unwrap();
        let names: Vec<&str> = index.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "LSP-Foo", "Z"]);
        let releases = index.find("LSP-Foo").unwrap().releases().unwrap();
        assert_eq!(releases[0].sublime_text, ">=4107");
        assert_eq!(releases[0].date, "2022-01-02 03:04:05");

        let outputs = apply_release(&repository, &args, &config).unwrap();
        assert_eq!(outputs.pr_title, "Update LSP-Foo");
        assert_eq!(RepositoryIndex::load(&repository).unwrap().packages.len(), 3);
    }

    #[test]
    fn test_rejected_asset_leaves_index_alone() {
        let dir = tempdir().unwrap();
        let repository = dir.path().join("repository.json");
        let event_path = dir.path().join("event.json");
        std::fs::write(&event_path, EVENT.replace("application/zip", "text/plain")).unwrap();

        let args = EventArgs {
            event: Some(event_path),
            sublime_text_version_range: None,
        };
        let err = apply_release(&repository, &args, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("LSP-Foo_osx-arm64.zip"));
        assert!(!repository.exists());
    }
}
