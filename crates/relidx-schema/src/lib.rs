//! Shared types for the relidx repository index.
//!
//! This crate owns the persisted `repository.json` format and the merge
//! (upsert) rules applied to it. Network and host logic live in
//! `relidx-core`.

pub mod index;
pub mod types;

// Re-exports
pub use index::{IndexError, PackageRecord, RepositoryIndex};
pub use types::*;

/// Compatibility range written when a release does not declare its own.
pub const DEFAULT_SUBLIME_TEXT_RANGE: &str = ">=3154";

/// Platform key meaning "every platform".
pub const ALL_PLATFORMS: &str = "*";
