//! Per-run response cache.
//!
//! One `ResponseCache` is created for a run and shared by every fetcher of
//! that run. Nothing outlives the run.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::Mutex;

/// Decoded JSON responses keyed by the exact request URL.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<Value> {
        self.entries.lock().await.get(url).cloned()
    }

    pub async fn insert(&self, url: &str, value: Value) {
        self.entries.lock().await.insert(url.to_string(), value);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
