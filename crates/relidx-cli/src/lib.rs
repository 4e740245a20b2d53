//! relidx - release index maintainer
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Keeps a `repository.json` package index in sync with the releases
//! published on GitHub, GitLab and BitBucket.
//!
//! # Commands
//!
//! - `release` / `translate`: turn a GitHub release event into index entries
//!   (one per zip asset), as run from a release workflow.
//! - `resolve` / `info`: inspect what a repository URL resolves to.
//! - `sync`: resolve repository URLs and merge them into the index.
//!
//! # Repository URLs
//!
//! ```text
//! https://github.com/{user}/{repo}[/tree/{branch} | /tags]
//! https://gitlab.com/{user}/{repo}[/-/tree/{branch} | /-/tags]
//! https://bitbucket.org/{user}/{repo}[/src/{branch} | #tags]
//! ```
//!
//! A tags URL yields one release per version tag. Any other URL yields a
//! single release of the branch head, versioned by its commit timestamp.

pub mod cmd;
pub mod config;

pub use relidx_core::USER_AGENT;
pub use relidx_schema::index;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "relidx")]
#[command(author, version, about = "relidx - release index maintainer")]
pub struct Cli {
    /// Index file to read and update
    #[arg(long, global = true, env = "RELIDX_REPOSITORY", default_value = "repository.json")]
    pub repository: PathBuf,

    /// Configuration file (defaults to ./relidx.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// API credentials, one per host. Never read from or written to the config
/// file.
#[derive(Debug, Clone, Default, Args)]
#[allow(clippy::struct_field_names)]
pub struct TokenArgs {
    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitLab API token
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    /// BitBucket API token
    #[arg(long, env = "BITBUCKET_TOKEN", hide_env_values = true)]
    pub bitbucket_token: Option<String>,
}

#[derive(Debug, Args)]
pub struct EventArgs {
    /// Release event JSON file (reads stdin when omitted)
    #[arg(long)]
    pub event: Option<PathBuf>,

    /// Compatibility range for releases whose notes do not declare one
    #[arg(long)]
    pub sublime_text_version_range: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge a GitHub release event into the index and print workflow outputs
    Release {
        #[command(flatten)]
        event: EventArgs,
    },
    /// Print the index payload for a GitHub release event
    Translate {
        #[command(flatten)]
        event: EventArgs,
    },
    /// Print the releases a repository URL resolves to
    Resolve {
        /// Repository, branch or tags URL
        url: String,
        /// Only consider tags starting with this prefix
        #[arg(long)]
        tag_prefix: Option<String>,
        #[command(flatten)]
        tokens: TokenArgs,
    },
    /// Print repository metadata
    Info {
        /// Repository or branch URL
        url: String,
        #[command(flatten)]
        tokens: TokenArgs,
    },
    /// Resolve repositories and merge them into the index
    Sync {
        /// Repository, branch or tags URLs
        #[arg(required = true)]
        urls: Vec<String>,
        /// Only consider tags starting with this prefix
        #[arg(long)]
        tag_prefix: Option<String>,
        /// Package name to use instead of the repository name (single URL only)
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        tokens: TokenArgs,
    },
}
