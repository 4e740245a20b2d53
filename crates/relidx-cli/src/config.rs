//! `relidx.toml` configuration.
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! [http]
//! timeout_secs = 30
//! max_retries = 2
//! backoff_ms = 500
//! max_rate_limit_wait_secs = 60
//! cache = true
//!
//! [hosts]
//! github_api = "https://api.github.com"
//! gitlab_api = "https://gitlab.com/api/v4"
//! bitbucket_api = "https://api.bitbucket.org/2.0"
//!
//! [release]
//! sublime_text = ">=3154"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relidx_core::{HostEndpoints, RetryPolicy};
use relidx_schema::DEFAULT_SUBLIME_TEXT_RANGE;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "relidx.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub http: HttpConfig,
    pub hosts: HostsConfig,
    pub release: ReleaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries for network errors and 5xx answers.
    pub max_retries: u32,
    /// First retry delay; doubles with each retry.
    pub backoff_ms: u64,
    /// Upper bound on sleeping for a rate-limit reset.
    pub max_rate_limit_wait_secs: u64,
    /// Share responses between requests of one run.
    pub cache: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            timeout_secs: 30,
            max_retries: policy.max_retries,
            backoff_ms: u64::try_from(policy.backoff.as_millis()).unwrap_or(500),
            max_rate_limit_wait_secs: policy.max_rate_limit_wait.as_secs(),
            cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_field_names)]
pub struct HostsConfig {
    pub github_api: String,
    pub gitlab_api: String,
    pub bitbucket_api: String,
}

impl Default for HostsConfig {
    fn default() -> Self {
        let endpoints = HostEndpoints::default();
        Self {
            github_api: endpoints.github_api,
            gitlab_api: endpoints.gitlab_api,
            bitbucket_api: endpoints.bitbucket_api,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Compatibility range for releases that do not declare one.
    pub sublime_text: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            sublime_text: DEFAULT_SUBLIME_TEXT_RANGE.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else `./relidx.toml` if present, else the
    /// defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            debug!(path = %local.display(), "using config");
            return Self::load(local);
        }
        Ok(Self::default())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.http.max_retries,
            backoff: Duration::from_millis(self.http.backoff_ms),
            max_rate_limit_wait: Duration::from_secs(self.http.max_rate_limit_wait_secs),
        }
    }

    pub fn endpoints(&self) -> HostEndpoints {
        HostEndpoints {
            github_api: self.hosts.github_api.clone(),
            gitlab_api: self.hosts.gitlab_api.clone(),
            bitbucket_api: self.hosts.bitbucket_api.clone(),
        }
    }
}
