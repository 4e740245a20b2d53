//! JSON fetch layer for host APIs.
//!
//! Every host request goes through [`Fetcher::fetch_json`], which owns the
//! retry policy: transient failures are retried with exponential backoff, a
//! rate-limit answer gets one bounded wait, everything else is returned as is.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::cache::ResponseCache;

/// Broad class of a [`FetchError`], used to decide between retrying and
/// giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network trouble or a 5xx answer; worth retrying.
    Transient,
    /// The host asked us to slow down.
    RateLimited,
    /// Retrying will not help.
    Fatal,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    #[error("Malformed JSON from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network { .. } => FetchErrorKind::Transient,
            Self::Status { status, .. } if status.is_server_error() => FetchErrorKind::Transient,
            Self::RateLimited { .. } => FetchErrorKind::RateLimited,
            Self::Status { .. } | Self::Malformed { .. } | Self::Exhausted { .. } => {
                FetchErrorKind::Fatal
            }
        }
    }

    /// HTTP status behind the failure, if the host sent one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { source, .. } => source.status(),
            Self::Exhausted { last, .. } => last.status(),
            Self::RateLimited { .. } | Self::Malformed { .. } => None,
        }
    }
}

/// Bounds on retrying a single request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
    /// Longest we are willing to sleep for a rate-limit reset.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

/// Build the HTTP client shared by all fetchers of a run.
///
/// `timeout` bounds each individual request.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_static(crate::USER_AGENT),
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
}

/// Authenticated GET + JSON decode against one host.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    auth: Option<HeaderValue>,
    cache: Option<Arc<ResponseCache>>,
    policy: RetryPolicy,
}

enum Failure {
    RateLimited(Duration),
    Error(FetchError),
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            auth: None,
            cache: None,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Send `value` as the `Authorization` header of every request.
    pub fn with_auth(mut self, mut value: HeaderValue) -> Self {
        value.set_sensitive(true);
        self.auth = Some(value);
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Result<Self, InvalidHeaderValue> {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        Ok(self.with_auth(value))
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// With `prefer_cache`, a response already fetched during this run is
    /// returned without touching the network. Successful responses are
    /// always cached.
    pub async fn fetch_json(&self, url: &str, prefer_cache: bool) -> Result<Value, FetchError> {
        if prefer_cache {
            if let Some(cache) = &self.cache {
                if let Some(value) = cache.get(url).await {
                    debug!(url, "cache hit");
                    return Ok(value);
                }
            }
        }

        let mut attempts = 0u32;
        let mut retries = 0u32;
        let mut waited_for_rate_limit = false;

        loop {
            attempts += 1;
            let failure = match self.attempt(url).await {
                Ok(value) => {
                    if let Some(cache) = &self.cache {
                        cache.insert(url, value.clone()).await;
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            match failure {
                Failure::RateLimited(wait) => {
                    if waited_for_rate_limit {
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                        });
                    }
                    waited_for_rate_limit = true;
                    warn!(url, wait_secs = wait.as_secs(), "rate limited, waiting for reset");
                    tokio::time::sleep(wait).await;
                }
                Failure::Error(err) if err.kind() == FetchErrorKind::Transient => {
                    if retries >= self.policy.max_retries {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.policy.backoff * 2u32.saturating_pow(retries);
                    retries += 1;
                    warn!(url, error = %err, retry = retries, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Failure::Error(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Value, Failure> {
        let network = |source| {
            Failure::Error(FetchError::Network {
                url: url.to_string(),
                source,
            })
        };

        let mut request = self.client.get(url);
        if let Some(auth) = &self.auth {
            request = request.header(header::AUTHORIZATION, auth.clone());
        }

        debug!(url, "GET");
        let response = request.send().await.map_err(network)?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(network)?;
            return serde_json::from_slice(&body).map_err(|source| {
                Failure::Error(FetchError::Malformed {
                    url: url.to_string(),
                    source,
                })
            });
        }

        let now = chrono::Utc::now().timestamp();
        if let Some(wait) = rate_limit_wait(
            status,
            response.headers(),
            now,
            self.policy.max_rate_limit_wait,
        ) {
            return Err(Failure::RateLimited(wait));
        }

        Err(Failure::Error(FetchError::Status {
            url: url.to_string(),
            status,
        }))
    }
}

/// How long to wait before retrying a rate-limited response, or `None` if
/// the response is not a rate-limit answer.
///
/// 429 is always a rate limit. 403 only counts when the host says so through
/// `Retry-After` or an exhausted `X-RateLimit-Remaining`. The wait comes from
/// `Retry-After` (seconds) or `X-RateLimit-Reset` (unix time) and is capped
/// at `cap`.
fn rate_limit_wait(status: StatusCode, headers: &HeaderMap, now: i64, cap: Duration) -> Option<Duration> {
    let header_num = |name: &str| -> Option<i64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };

    let retry_after = header_num("retry-after");
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .is_some_and(|v| v.as_bytes() == b"0");

    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (exhausted || retry_after.is_some()));
    if !limited {
        return None;
    }

    let secs = retry_after
        .or_else(|| header_num("x-ratelimit-reset").map(|reset| reset - now))
        .map(|s| u64::try_from(s).unwrap_or(0));

    Some(secs.map_or(cap, |s| Duration::from_secs(s).min(cap)))
}
