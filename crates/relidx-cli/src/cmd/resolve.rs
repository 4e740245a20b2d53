//! Resolve command

use anyhow::{Result, bail};
use relidx_core::Resolution;
use relidx_schema::{Platforms, ReleaseEntry};
use tracing::warn;

use super::build_registry;
use crate::TokenArgs;
use crate::config::Config;

/// Print the releases behind a repository URL as a JSON array.
pub async fn resolve(
    url: &str,
    tag_prefix: Option<&str>,
    tokens: &TokenArgs,
    config: &Config,
) -> Result<()> {
    let registry = build_registry(config, tokens)?;

    let entries: Vec<ReleaseEntry> = match registry.resolve_releases(url, tag_prefix).await? {
        Resolution::Found(releases) => releases
            .into_iter()
            .map(|r| r.into_entry(Platforms::default(), &config.release.sublime_text))
            .collect(),
        Resolution::EmptyBranch => {
            warn!(url, "no releases found");
            Vec::new()
        }
        Resolution::NotRecognized => bail!("No supported host recognizes {url}"),
    };

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
