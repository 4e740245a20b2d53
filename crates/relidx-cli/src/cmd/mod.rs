pub mod info;
pub mod release;
pub mod resolve;
pub mod sync;
pub mod translate;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use relidx_core::io::cache::ResponseCache;
use relidx_core::io::fetch::build_client;
use relidx_core::release::ReleaseEvent;
use relidx_core::{Fetcher, ResolverRegistry};
use relidx_schema::RepositoryIndex;
use tracing::warn;

use crate::TokenArgs;
use crate::config::Config;

/// Registry of the built-in hosts, sharing one client and one run cache.
pub fn build_registry(config: &Config, tokens: &TokenArgs) -> Result<ResolverRegistry> {
    let client = build_client(config.timeout()).context("Failed to build HTTP client")?;
    let cache = config.http.cache.then(|| Arc::new(ResponseCache::new()));

    let fetcher = |token: Option<&str>| -> Result<Fetcher> {
        let mut fetcher = Fetcher::new(client.clone()).with_policy(config.retry_policy());
        if let Some(cache) = &cache {
            fetcher = fetcher.with_cache(Arc::clone(cache));
        }
        if let Some(token) = token {
            fetcher = fetcher
                .with_bearer_token(token)
                .context("API token is not a valid header value")?;
        }
        Ok(fetcher)
    };

    Ok(ResolverRegistry::with_defaults(
        &config.endpoints(),
        fetcher(tokens.github_token.as_deref())?,
        fetcher(tokens.gitlab_token.as_deref())?,
        fetcher(tokens.bitbucket_token.as_deref())?,
    ))
}

/// Load the index, starting an empty one if the file does not exist yet.
pub fn load_index(path: &Path) -> Result<RepositoryIndex> {
    if !path.exists() {
        warn!(path = %path.display(), "index not found, starting a new one");
        return Ok(RepositoryIndex::new());
    }
    RepositoryIndex::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Parse a release event from `path`, or from stdin when `None`.
pub fn read_event(path: Option<&Path>) -> Result<ReleaseEvent> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read release event from stdin")?;
            content
        }
    };
    serde_json::from_str(&content).context("Invalid release event")
}
