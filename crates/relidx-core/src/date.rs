//! Timestamp helpers.
//!
//! The index stores every release date as `YYYY-MM-DD HH:MM:SS` in UTC,
//! whatever format the host used.

use chrono::{DateTime, NaiveDateTime, Utc};

/// `strftime` layout of index timestamps.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Convert a host ISO-8601 timestamp to the canonical index format.
///
/// Offsets are normalized to UTC and fractional seconds dropped. A
/// timestamp without any zone designator is taken to be UTC already.
pub fn translate_date(iso: &str) -> Result<String, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => Ok(dt.with_timezone(&Utc).format(CANONICAL_FORMAT).to_string()),
        Err(_) => NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|dt| dt.format(CANONICAL_FORMAT).to_string()),
    }
}

/// Version string for a branch snapshot: the canonical timestamp with every
/// `-`, `:` and space turned into `.`.
pub fn timestamp_version(timestamp: &str) -> String {
    timestamp.replace(['-', ':', ' '], ".")
}
