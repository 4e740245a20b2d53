//! Errors shared by the pagination walker and the host resolvers.

use std::fmt::Display;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::io::fetch::FetchError;

/// A host answered with JSON that does not have the expected shape.
#[derive(Error, Debug)]
#[error("Unexpected response from {url}: {message}")]
pub struct ParseError {
    /// URL whose response could not be interpreted.
    pub url: String,
    /// What was wrong with it.
    pub message: String,
}

impl ParseError {
    pub fn new(url: impl Into<String>, message: impl Display) -> Self {
        Self {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Failure while resolving releases or metadata for one repository.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ResolveError {
    /// HTTP status behind the failure, if the host sent one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Fetch(e) => e.status(),
            Self::Parse(_) => None,
        }
    }
}

/// Deserialize a host response, attributing shape errors to `url`.
pub(crate) fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|e| ParseError::new(url, e))
}
