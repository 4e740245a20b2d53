//! Sync command

use std::path::Path;

use anyhow::{Context, Result, bail};
use relidx_core::indexer::{PackageSource, ReleaseDefaults, SyncOutcome, SyncReport, sync_packages};
use relidx_schema::Platforms;

use super::{build_registry, load_index};
use crate::TokenArgs;
use crate::config::Config;

/// Resolve every URL, merge the successful ones and write the index once.
///
/// Fails after writing if any package could not be resolved.
pub async fn sync(
    repository: &Path,
    urls: &[String],
    tag_prefix: Option<&str>,
    name: Option<&str>,
    tokens: &TokenArgs,
    config: &Config,
) -> Result<()> {
    if name.is_some() && urls.len() > 1 {
        bail!("--name can only be used with a single URL");
    }

    let sources: Vec<PackageSource> = urls
        .iter()
        .map(|url| PackageSource {
            url: url.clone(),
            name: name.map(str::to_string),
            tag_prefix: tag_prefix.map(str::to_string),
        })
        .collect();
    let defaults = ReleaseDefaults {
        platforms: Platforms::default(),
        sublime_text: config.release.sublime_text.clone(),
    };

    let registry = build_registry(config, tokens)?;
    let mut index = load_index(repository)?;

    println!("  syncing {} package(s)", sources.len());
    let reports = sync_packages(&registry, &mut index, &sources, &defaults).await;
    let summary = summarize(&reports);

    if summary.changed > 0 {
        index
            .save(repository)
            .with_context(|| format!("Failed to write {}", repository.display()))?;
    }

    for line in &summary.lines {
        println!("{line}");
    }
    println!(
        "\n  {} changed, {} skipped, {} failed",
        summary.changed, summary.skipped, summary.failed
    );

    if summary.failed > 0 {
        bail!("{} package(s) failed", summary.failed);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Summary {
    lines: Vec<String>,
    changed: usize,
    skipped: usize,
    failed: usize,
}

fn summarize(reports: &[SyncReport]) -> Summary {
    let mut summary = Summary::default();
    for report in reports {
        let line = match &report.result {
            Ok(SyncOutcome::Created(name)) => {
                summary.changed += 1;
                format!("  added    {name}")
            }
            Ok(SyncOutcome::Updated(name)) => {
                summary.changed += 1;
                format!("  updated  {name}")
            }
            Ok(SyncOutcome::NoReleases(name)) => {
                summary.skipped += 1;
                format!("  skipped  {name} (no releases)")
            }
            Ok(SyncOutcome::NotRecognized) => {
                summary.skipped += 1;
                format!("  skipped  {} (unsupported URL)", report.url)
            }
            Err(e) => {
                summary.failed += 1;
                format!("  failed   {e}")
            }
        };
        summary.lines.push(line);
    }
    summary
}
