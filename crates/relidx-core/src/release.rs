//! Translation of a GitHub `release` event into an index payload.
//!
//! Each zip asset attached to the release becomes one release entry. The
//! target platform is read from the asset name
//! (`LSP-Foo_windows-x64.zip` is `windows-x64`) and the compatibility range
//! from a `Sublime-Text-Version-Range: ` line in the release notes.

use relidx_schema::{ALL_PLATFORMS, PackagePayload, Platforms, ReleaseEntry};
use serde::Deserialize;
use thiserror::Error;

use crate::date::translate_date;

/// Release-notes line declaring the compatible Sublime Text builds.
pub const VERSION_RANGE_MARKER: &str = "Sublime-Text-Version-Range: ";

const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Markers in an asset name that mean it targets a single platform.
const PLATFORM_MARKERS: &[&str] = &["_windows", "_osx", "_linux"];

/// The parts of a GitHub `release` webhook payload we use.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEvent {
    pub release: GithubRelease,
    pub repository: GithubRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    pub published_at: String,
    /// Release notes; GitHub sends `null` when they are empty.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    pub content_type: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepository {
    pub name: String,
    pub html_url: String,
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Release asset \"{asset}\" is not of type \"application/zip\" (got \"{content_type}\")")]
    UnexpectedContentType { asset: String, content_type: String },

    #[error("Invalid release date {value:?}: {source}")]
    Date {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl GithubRelease {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// The declared version range from release notes, if any.
pub fn version_range_from_body(body: &str) -> Option<&str> {
    body.lines()
        .find_map(|line| line.strip_prefix(VERSION_RANGE_MARKER))
}

/// Platform key encoded in an asset name, or `"*"` for platform-independent
/// assets.
pub fn platform_from_asset_name(name: &str) -> String {
    if !PLATFORM_MARKERS.iter().any(|marker| name.contains(marker)) {
        return ALL_PLATFORMS.to_string();
    }

    let mut parts = name.rsplit('.');
    let stem = match (parts.next(), parts.next()) {
        (Some(_), Some(stem)) => stem,
        _ => name,
    };
    stem.rsplit('_').next().unwrap_or(stem).to_string()
}

/// Build the index payload for a release event.
///
/// The compatibility range comes from the release notes, then
/// `fallback_range`.
///
/// # Errors
///
/// Fails if any asset is not a zip archive or the publish date is invalid.
pub fn translate_release(
    event: &ReleaseEvent,
    fallback_range: &str,
) -> Result<PackagePayload, TranslateError> {
    let release = &event.release;
    let sublime_text = version_range_from_body(release.body_text()).unwrap_or(fallback_range);
    let date = translate_date(&release.published_at).map_err(|source| TranslateError::Date {
        value: release.published_at.clone(),
        source,
    })?;

    let releases = release
        .assets
        .iter()
        .map(|asset| {
            if asset.content_type != ZIP_CONTENT_TYPE {
                return Err(TranslateError::UnexpectedContentType {
                    asset: asset.name.clone(),
                    content_type: asset.content_type.clone(),
                });
            }
            Ok(ReleaseEntry {
                version: release.tag_name.clone(),
                url: asset.browser_download_url.clone(),
                date: date.clone(),
                platforms: Platforms::One(platform_from_asset_name(&asset.name)),
                sublime_text: sublime_text.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PackagePayload {
        name: event.repository.name.clone(),
        details: event.repository.html_url.clone(),
        releases,
    })
}
