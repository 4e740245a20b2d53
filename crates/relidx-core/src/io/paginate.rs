//! Walks a host's paginated listing one page at a time.
//!
//! Each page URL depends on the previous response, so pages are fetched
//! strictly in sequence and the first failure ends the walk.

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::fetch::Fetcher;
use crate::error::{ParseError, ResolveError, decode};

/// How a host links one page of a listing to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `{"values": [...], "next": "<url>"}`; the walk ends when `next` is
    /// absent or null (BitBucket).
    NextField,
    /// The body is a bare JSON array and pages are addressed with `page` /
    /// `per_page` query parameters; a short page is the last one (GitHub,
    /// GitLab).
    PageNumber { per_page: usize },
    /// The endpoint is not paginated; one request returns everything.
    Single,
}

#[derive(Deserialize)]
struct NextFieldPage {
    values: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

/// Page-at-a-time iterator over a listing.
#[derive(Debug)]
pub struct PageWalker<'a> {
    fetcher: &'a Fetcher,
    style: Pagination,
    next_url: Option<String>,
    page: u32,
    prefer_cache: bool,
}

impl<'a> PageWalker<'a> {
    pub fn new(fetcher: &'a Fetcher, first_url: impl Into<String>, style: Pagination) -> Self {
        Self {
            fetcher,
            style,
            next_url: Some(first_url.into()),
            page: 1,
            prefer_cache: false,
        }
    }

    /// Serve pages from the run cache when they were already fetched.
    pub fn prefer_cache(mut self, prefer_cache: bool) -> Self {
        self.prefer_cache = prefer_cache;
        self
    }

    /// Fetch the next page, or `None` once the host reported the last one.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, ResolveError> {
        let Some(base) = self.next_url.take() else {
            return Ok(None);
        };

        let url = match self.style {
            Pagination::PageNumber { per_page } => with_page(&base, self.page, per_page)?,
            Pagination::NextField | Pagination::Single => base.clone(),
        };

        debug!(url = %url, page = self.page, "fetching page");
        let body = self.fetcher.fetch_json(&url, self.prefer_cache).await?;

        let items = match self.style {
            Pagination::NextField => {
                let page: NextFieldPage = decode(&url, body)?;
                self.next_url = page.next;
                page.values
            }
            Pagination::PageNumber { per_page } => {
                let Value::Array(items) = body else {
                    return Err(ParseError::new(&url, "expected a JSON array").into());
                };
                if items.len() >= per_page && per_page > 0 {
                    self.next_url = Some(base);
                }
                items
            }
            Pagination::Single => match body {
                Value::Array(items) => items,
                _ => return Err(ParseError::new(&url, "expected a JSON array").into()),
            },
        };

        self.page += 1;
        Ok(Some(items))
    }

    /// Drain every remaining page, concatenating items in host order.
    pub async fn collect_all(mut self) -> Result<Vec<Value>, ResolveError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

/// Set the `page` and `per_page` query parameters of `url`, keeping the rest.
fn with_page(url: &str, page: u32, per_page: usize) -> Result<String, ParseError> {
    let mut parsed = Url::parse(url).map_err(|e| ParseError::new(url, e))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "page" && k != "per_page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("per_page", &per_page.to_string())
        .append_pair("page", &page.to_string());
    Ok(parsed.into())
}
