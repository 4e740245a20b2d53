//! Info command

use anyhow::{Result, bail};

use super::build_registry;
use crate::TokenArgs;
use crate::config::Config;

/// Print repository metadata as JSON.
pub async fn info(url: &str, tokens: &TokenArgs, config: &Config) -> Result<()> {
    let registry = build_registry(config, tokens)?;
    let Some(metadata) = registry.resolve_repository_metadata(url).await? else {
        bail!("No supported host recognizes {url}");
    };
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
